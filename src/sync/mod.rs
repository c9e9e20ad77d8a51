pub mod cues;
pub mod dispatcher;
pub mod position;

pub use cues::{CueEvent, CueKind, CuePayload, CueTimeline, Mode, PITCH_CLASSES};
pub use dispatcher::{CueDispatcher, FiredCue};
pub use position::{PlaybackSignal, PlaybackSnapshot, PositionEstimator};
