//! Audio-reactive animation parameters from a polled playback clock and a
//! precomputed cue timeline.

pub mod audio;
pub mod config;
pub mod effects;
pub mod error;
pub mod session;
pub mod sources;
pub mod sync;
pub mod ui;

pub use config::{SessionConfig, SmoothingMode};
pub use effects::{CueListener, ReactiveParameterEngine, ReactiveParameters};
pub use error::SourceError;
pub use session::{SessionRunner, SessionSummary, VisualizerSession};
pub use sync::{CueDispatcher, CueEvent, CueKind, CueTimeline, PositionEstimator};
