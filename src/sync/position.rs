use crate::sources::TrackInfo;
use log::{debug, info};
use std::time::Instant;

/// Point-in-time playback state obtained by polling.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    /// Empty when the remote player reports playback without a track
    pub track_id: String,
    pub is_playing: bool,
    pub progress_ms: f64,
    pub captured_at: Instant,
    pub track: Option<TrackInfo>,
}

impl PlaybackSnapshot {
    fn extrapolate(&self, now: Instant) -> f64 {
        if self.is_playing {
            let elapsed = now.saturating_duration_since(self.captured_at);
            self.progress_ms + elapsed.as_secs_f64() * 1000.0
        } else {
            self.progress_ms
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackSignal {
    /// Emitted before any other signal from the same snapshot
    TrackChanged {
        track_id: String,
        track: Option<TrackInfo>,
    },
    PlayStateChanged(bool),
    /// The snapshot moved the clock by more than the seek threshold
    Seeked { from_ms: f64, to_ms: f64 },
    /// Small correction between the extrapolated and the reported position
    Resynced { drift_ms: f64 },
}

/// Extrapolates a smooth playback clock from sparse snapshots.
pub struct PositionEstimator {
    snapshot: Option<PlaybackSnapshot>,
    track_id: Option<String>,
    playing: bool,
    frozen_ms: f64,
    seek_threshold_ms: f64,
}

impl PositionEstimator {
    pub fn new(seek_threshold_ms: f64) -> Self {
        Self {
            snapshot: None,
            track_id: None,
            playing: false,
            frozen_ms: 0.0,
            seek_threshold_ms,
        }
    }

    /// Take in the result of one poll; `None` means nothing is playing.
    ///
    /// `observed_at` is when the poll completed. The clock stops at the
    /// position extrapolated to that moment when playback has ended.
    /// Returns the transitions this snapshot caused, track changes first.
    pub fn ingest_snapshot(&mut self, snapshot: Option<PlaybackSnapshot>, observed_at: Instant) -> Vec<PlaybackSignal> {
        let mut signals = Vec::new();

        let Some(snapshot) = snapshot else {
            if self.playing {
                info!("Playback stopped");
                signals.push(PlaybackSignal::PlayStateChanged(false));
            }
            if let Some(previous) = self.snapshot.take() {
                self.frozen_ms = previous.extrapolate(observed_at);
            }
            self.playing = false;
            self.track_id = None;
            return signals;
        };

        let same_track = self.track_id.as_deref() == Some(snapshot.track_id.as_str());
        if !same_track {
            info!("Track changed: {:?} -> {:?}", self.track_id, snapshot.track_id);
            self.track_id = Some(snapshot.track_id.clone());
            signals.push(PlaybackSignal::TrackChanged {
                track_id: snapshot.track_id.clone(),
                track: snapshot.track.clone(),
            });
        }

        if snapshot.is_playing != self.playing {
            info!("Play state changed: playing={}", snapshot.is_playing);
            self.playing = snapshot.is_playing;
            signals.push(PlaybackSignal::PlayStateChanged(snapshot.is_playing));
        }

        if same_track {
            if let Some(previous) = &self.snapshot {
                let expected = previous.extrapolate(snapshot.captured_at);
                let drift = snapshot.progress_ms - expected;
                if drift.abs() > self.seek_threshold_ms {
                    info!("Seek detected: {:.0}ms -> {:.0}ms", expected, snapshot.progress_ms);
                    signals.push(PlaybackSignal::Seeked {
                        from_ms: expected,
                        to_ms: snapshot.progress_ms,
                    });
                } else if drift.abs() >= 1.0 {
                    debug!("Clock drift corrected by {:.1}ms", drift);
                    signals.push(PlaybackSignal::Resynced { drift_ms: drift });
                }
            }
        }

        self.snapshot = Some(snapshot);
        signals
    }

    /// Playback position in milliseconds at `now`.
    ///
    /// Frozen while paused or stopped; extrapolated linearly while playing and
    /// never clamped to the track duration.
    pub fn estimate_position(&self, now: Instant) -> f64 {
        match &self.snapshot {
            Some(snapshot) => snapshot.extrapolate(now),
            None => self.frozen_ms,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn track_id(&self) -> Option<&str> {
        self.track_id.as_deref()
    }

    pub fn snapshot(&self) -> Option<&PlaybackSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.seek_threshold_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snapshot(track_id: &str, is_playing: bool, progress_ms: f64, captured_at: Instant) -> Option<PlaybackSnapshot> {
        Some(PlaybackSnapshot {
            track_id: track_id.to_string(),
            is_playing,
            progress_ms,
            captured_at,
            track: None,
        })
    }

    #[test]
    fn extrapolates_while_playing() {
        let t0 = Instant::now();
        let mut estimator = PositionEstimator::new(1500.0);
        estimator.ingest_snapshot(snapshot("a", true, 10_000.0, t0), t0);
        let estimate = estimator.estimate_position(t0 + Duration::from_millis(2500));
        assert!((estimate - 12_500.0).abs() < 1e-6);
    }

    #[test]
    fn clock_is_frozen_while_paused() {
        let t0 = Instant::now();
        let mut estimator = PositionEstimator::new(1500.0);
        estimator.ingest_snapshot(snapshot("a", false, 5000.0, t0), t0);
        for offset in [0, 10, 2500, 60_000] {
            assert_eq!(estimator.estimate_position(t0 + Duration::from_millis(offset)), 5000.0);
        }
    }

    #[test]
    fn estimate_is_monotonic_between_snapshots() {
        let t0 = Instant::now();
        let mut estimator = PositionEstimator::new(1500.0);
        estimator.ingest_snapshot(snapshot("a", true, 0.0, t0), t0);
        let mut previous = f64::MIN;
        for ms in (0..3000).step_by(16) {
            let estimate = estimator.estimate_position(t0 + Duration::from_millis(ms));
            assert!(estimate >= previous);
            previous = estimate;
        }
    }

    #[test]
    fn first_snapshot_reports_track_and_play_state() {
        let t0 = Instant::now();
        let mut estimator = PositionEstimator::new(1500.0);
        let signals = estimator.ingest_snapshot(snapshot("a", true, 0.0, t0), t0);
        assert_eq!(
            signals,
            vec![
                PlaybackSignal::TrackChanged {
                    track_id: "a".to_string(),
                    track: None
                },
                PlaybackSignal::PlayStateChanged(true),
            ]
        );
    }

    #[test]
    fn pause_and_stop_emit_play_state_changes() {
        let t0 = Instant::now();
        let mut estimator = PositionEstimator::new(1500.0);
        estimator.ingest_snapshot(snapshot("a", true, 0.0, t0), t0);

        let signals = estimator.ingest_snapshot(snapshot("a", false, 3000.0, t0 + Duration::from_secs(3)), t0 + Duration::from_secs(3));
        assert_eq!(signals, vec![PlaybackSignal::PlayStateChanged(false)]);

        estimator.ingest_snapshot(snapshot("a", true, 3000.0, t0 + Duration::from_secs(6)), t0 + Duration::from_secs(6));
        let signals = estimator.ingest_snapshot(None, t0 + Duration::from_secs(6));
        assert_eq!(signals, vec![PlaybackSignal::PlayStateChanged(false)]);
        assert!(!estimator.is_playing());
        assert_eq!(estimator.estimate_position(t0 + Duration::from_secs(60)), 3000.0);

        // Nothing playing twice in a row is not a transition
        assert!(estimator.ingest_snapshot(None, t0 + Duration::from_secs(7)).is_empty());
        assert_eq!(estimator.estimate_position(t0 + Duration::from_secs(60)), 3000.0);
    }

    #[test]
    fn stop_freezes_clock_where_playback_had_reached() {
        let t0 = Instant::now();
        let mut estimator = PositionEstimator::new(1500.0);
        estimator.ingest_snapshot(snapshot("a", true, 20_000.0, t0), t0);

        let stopped_at = t0 + Duration::from_millis(2400);
        assert!((estimator.estimate_position(stopped_at) - 22_400.0).abs() < 1e-6);
        estimator.ingest_snapshot(None, stopped_at);

        // No jump back to the last reported progress
        for later in [0, 500, 30_000] {
            let estimate = estimator.estimate_position(stopped_at + Duration::from_millis(later));
            assert!((estimate - 22_400.0).abs() < 1e-6);
        }
    }

    #[test]
    fn stop_after_pause_keeps_paused_position() {
        let t0 = Instant::now();
        let mut estimator = PositionEstimator::new(1500.0);
        estimator.ingest_snapshot(snapshot("a", false, 7000.0, t0), t0);
        estimator.ingest_snapshot(None, t0 + Duration::from_secs(5));
        assert_eq!(estimator.estimate_position(t0 + Duration::from_secs(10)), 7000.0);
    }

    #[test]
    fn backward_jump_is_surfaced_as_seek() {
        let t0 = Instant::now();
        let mut estimator = PositionEstimator::new(1500.0);
        estimator.ingest_snapshot(snapshot("a", true, 60_000.0, t0), t0);
        let signals = estimator.ingest_snapshot(snapshot("a", true, 10_000.0, t0 + Duration::from_secs(3)), t0 + Duration::from_secs(3));
        assert_eq!(
            signals,
            vec![PlaybackSignal::Seeked {
                from_ms: 63_000.0,
                to_ms: 10_000.0
            }]
        );
        let estimate = estimator.estimate_position(t0 + Duration::from_secs(4));
        assert!((estimate - 11_000.0).abs() < 1e-6);
    }

    #[test]
    fn small_drift_is_a_resync_not_a_seek() {
        let t0 = Instant::now();
        let mut estimator = PositionEstimator::new(1500.0);
        estimator.ingest_snapshot(snapshot("a", true, 0.0, t0), t0);
        let signals = estimator.ingest_snapshot(snapshot("a", true, 2880.0, t0 + Duration::from_secs(3)), t0 + Duration::from_secs(3));
        match signals.as_slice() {
            [PlaybackSignal::Resynced { drift_ms }] => assert!((drift_ms + 120.0).abs() < 1e-6),
            other => panic!("unexpected signals: {:?}", other),
        }
    }

    #[test]
    fn new_track_is_not_treated_as_seek() {
        let t0 = Instant::now();
        let mut estimator = PositionEstimator::new(1500.0);
        estimator.ingest_snapshot(snapshot("a", true, 200_000.0, t0), t0);
        let signals = estimator.ingest_snapshot(snapshot("b", true, 0.0, t0 + Duration::from_secs(3)), t0 + Duration::from_secs(3));
        assert_eq!(
            signals,
            vec![PlaybackSignal::TrackChanged {
                track_id: "b".to_string(),
                track: None
            }]
        );
    }

    #[test]
    fn resuming_after_stop_reports_track_again() {
        let t0 = Instant::now();
        let mut estimator = PositionEstimator::new(1500.0);
        estimator.ingest_snapshot(snapshot("a", true, 0.0, t0), t0);
        estimator.ingest_snapshot(None, t0 + Duration::from_secs(1));
        let signals = estimator.ingest_snapshot(snapshot("a", true, 5000.0, t0 + Duration::from_secs(9)), t0 + Duration::from_secs(9));
        assert!(matches!(signals.first(), Some(PlaybackSignal::TrackChanged { .. })));
    }
}
