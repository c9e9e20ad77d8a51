//! External time sources: playback snapshots and precomputed cue timelines.

pub mod analysis;
pub mod cache;
pub mod local;
pub mod remote;

pub use analysis::{process_analysis, validate_track_id, AnalysisResponse, AnalysisStats, RawAnalysis, RawFeatures};
pub use cache::CachedCueProvider;
pub use local::{FileCueProvider, LocalClockSource};
pub use remote::RemoteClient;

use crate::error::SourceError;
use crate::sync::PlaybackSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub album_art: Option<String>,
    pub duration_ms: u64,
}

/// What a snapshot source reports for one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub progress_ms: u64,
    pub track: Option<TrackInfo>,
}

impl PlaybackState {
    pub fn into_snapshot(self, captured_at: Instant) -> PlaybackSnapshot {
        PlaybackSnapshot {
            track_id: self.track.as_ref().map(|track| track.id.clone()).unwrap_or_default(),
            is_playing: self.is_playing,
            progress_ms: self.progress_ms as f64,
            captured_at,
            track: self.track,
        }
    }
}

/// Periodically polled playback state. `Ok(None)` means nothing is playing.
#[async_trait]
pub trait SnapshotSource: Send {
    async fn poll(&mut self) -> Result<Option<PlaybackState>, SourceError>;
}

/// Returns the precomputed analysis for a track.
#[async_trait]
pub trait CueProvider: Send + Sync {
    async fn fetch_timeline(&self, track_id: &str) -> Result<AnalysisResponse, SourceError>;
}

#[async_trait]
impl<P: CueProvider + ?Sized> CueProvider for std::sync::Arc<P> {
    async fn fetch_timeline(&self, track_id: &str) -> Result<AnalysisResponse, SourceError> {
        (**self).fetch_timeline(track_id).await
    }
}
