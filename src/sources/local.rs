use super::analysis::{process_analysis, AnalysisResponse, RawAnalysis};
use super::{CueProvider, PlaybackState, SnapshotSource, TrackInfo};
use crate::error::SourceError;
use async_trait::async_trait;
use log::{debug, info};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Reads `<dir>/<track_id>.json` timeline files.
///
/// Files may hold either a processed analysis (as written by `cue-tool`) or a
/// raw analysis body, which is processed on load.
pub struct FileCueProvider {
    dir: PathBuf,
}

impl FileCueProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, track_id: &str) -> Result<PathBuf, SourceError> {
        let track_id = track_id.trim();
        let usable = !track_id.is_empty()
            && track_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !usable {
            return Err(SourceError::InvalidTrackId(track_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", track_id)))
    }
}

/// Parse a timeline file body, processed form first.
pub fn parse_timeline_file(track_id: &str, json: &str) -> Result<AnalysisResponse, SourceError> {
    if let Ok(processed) = serde_json::from_str::<AnalysisResponse>(json) {
        return Ok(processed);
    }
    let raw: RawAnalysis = serde_json::from_str(json)?;
    Ok(process_analysis(track_id, raw, None))
}

#[async_trait]
impl CueProvider for FileCueProvider {
    async fn fetch_timeline(&self, track_id: &str) -> Result<AnalysisResponse, SourceError> {
        let path = self.path_for(track_id)?;
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SourceError::NotFound(format!("Timeline {}", path.display())))
            }
            Err(err) => return Err(err.into()),
        };
        debug!("Read timeline {}", path.display());
        parse_timeline_file(track_id.trim(), &json)
    }
}

/// Pretends one track is playing from the first poll onwards.
///
/// Reports nothing once the track has run out, like a player that stopped.
pub struct LocalClockSource {
    track: TrackInfo,
    started_at: Option<Instant>,
    start_offset: Duration,
}

impl LocalClockSource {
    pub fn new(track: TrackInfo) -> Self {
        Self {
            track,
            started_at: None,
            start_offset: Duration::ZERO,
        }
    }

    /// Start playback part-way into the track.
    pub fn starting_at(mut self, offset: Duration) -> Self {
        self.start_offset = offset;
        self
    }

    pub fn track(&self) -> &TrackInfo {
        &self.track
    }

    /// Playback state as seen at `now`.
    pub fn state_at(&mut self, now: Instant) -> Option<PlaybackState> {
        let started_at = *self.started_at.get_or_insert_with(|| {
            info!("Local clock started for {} ({})", self.track.name, self.track.id);
            now
        });
        let progress = self.start_offset + now.saturating_duration_since(started_at);
        let progress_ms = progress.as_millis() as u64;

        if self.track.duration_ms > 0 && progress_ms >= self.track.duration_ms {
            return None;
        }

        Some(PlaybackState {
            is_playing: true,
            progress_ms,
            track: Some(self.track.clone()),
        })
    }
}

#[async_trait]
impl SnapshotSource for LocalClockSource {
    async fn poll(&mut self) -> Result<Option<PlaybackState>, SourceError> {
        Ok(self.state_at(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(duration_ms: u64) -> TrackInfo {
        TrackInfo {
            id: "demo".to_string(),
            name: "Demo".to_string(),
            artist: "Nobody".to_string(),
            album: "Nowhere".to_string(),
            album_art: None,
            duration_ms,
        }
    }

    #[test]
    fn local_clock_advances_then_stops() {
        let mut source = LocalClockSource::new(track(10_000)).starting_at(Duration::from_secs(2));
        let t0 = Instant::now();
        let first = source.state_at(t0).unwrap();
        assert_eq!(first.progress_ms, 2000);
        assert!(first.is_playing);

        let later = source.state_at(t0 + Duration::from_secs(3)).unwrap();
        assert_eq!(later.progress_ms, 5000);
        assert!(source.state_at(t0 + Duration::from_secs(8)).is_none());
    }

    #[tokio::test]
    async fn reads_processed_and_raw_timeline_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("processed.json"),
            r#"{"track_id":"processed","duration":10.0,"tempo":100.0,"energy":0.7,
                "beats":[{"start":0.5,"confidence":0.2}],"segments":[],"sections":[]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("raw.json"),
            r#"{"beats":[{"start":0.5,"duration":0.5,"confidence":0.2},
                         {"start":1.0,"duration":0.5,"confidence":0.8}]}"#,
        )
        .unwrap();

        let provider = FileCueProvider::new(dir.path());
        let processed = provider.fetch_timeline("processed").await.unwrap();
        // Processed files are taken as-is
        assert_eq!(processed.beats.len(), 1);
        assert_eq!(processed.tempo, 100.0);

        let raw = provider.fetch_timeline("raw").await.unwrap();
        assert_eq!(raw.track_id, "raw");
        assert_eq!(raw.beats.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_and_path_tricks_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileCueProvider::new(dir.path());
        assert!(matches!(
            provider.fetch_timeline("absent").await,
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            provider.fetch_timeline("../secret").await,
            Err(SourceError::InvalidTrackId(_))
        ));
        assert!(matches!(
            provider.fetch_timeline("").await,
            Err(SourceError::InvalidTrackId(_))
        ));
    }
}
