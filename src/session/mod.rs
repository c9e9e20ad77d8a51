//! One visualization session: the playback clock, the cue dispatcher and the
//! reactive engine, advanced together once per frame.

pub mod runner;

pub use runner::{PollOutcome, SessionEvent, SessionRunner};

use crate::config::{SessionConfig, SmoothingMode};
use crate::effects::{CueListener, ReactiveParameterEngine, ReactiveParameters};
use crate::error::SourceError;
use crate::sources::{AnalysisResponse, TrackInfo};
use crate::sync::{CueDispatcher, CueEvent, CueKind, PlaybackSignal, PlaybackSnapshot, PositionEstimator};
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Instant;

/// Counters reported when a session ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub frames: u64,
    pub polls: u64,
    pub poll_failures: u64,
    pub track_changes: u64,
    pub seeks: u64,
    pub timelines_loaded: u64,
    pub timeline_failures: u64,
    pub beats_fired: u64,
    pub segments_fired: u64,
    pub sections_fired: u64,
    pub cues_dropped: u64,
}

impl SessionSummary {
    fn count_fired(&mut self, kind: CueKind) {
        match kind {
            CueKind::Beat => self.beats_fired += 1,
            CueKind::Segment => self.segments_fired += 1,
            CueKind::Section => self.sections_fired += 1,
        }
    }
}

/// Tempo, energy and length of the loaded timeline's track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineInfo {
    pub duration: f64,
    pub tempo: f32,
    pub energy: f32,
}

pub struct VisualizerSession {
    config: SessionConfig,
    estimator: PositionEstimator,
    dispatcher: CueDispatcher,
    engine: ReactiveParameterEngine,
    active: bool,
    track: Option<TrackInfo>,
    timeline: Option<TimelineInfo>,
    last_frame: Option<Instant>,
    summary: SessionSummary,
}

impl VisualizerSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            estimator: PositionEstimator::new(config.seek_threshold_ms),
            dispatcher: CueDispatcher::new(config.event_queue_capacity),
            engine: ReactiveParameterEngine::new(config.reactive.clone()),
            config,
            active: false,
            track: None,
            timeline: None,
            last_frame: None,
            summary: SessionSummary::default(),
        }
    }

    /// Begin a fresh session. Every channel, cursor and counter starts over.
    pub fn start(&mut self) {
        self.estimator.reset();
        self.dispatcher.clear();
        self.engine.reset();
        self.track = None;
        self.timeline = None;
        self.last_frame = None;
        self.summary = SessionSummary::default();
        self.active = true;
        info!("Session started");
    }

    /// Empty the timeline and ignore any result that arrives afterwards.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.dispatcher.clear();
        self.timeline = None;
        self.summary.cues_dropped = self.dispatcher.dropped();
        info!("Session stopped after {} frames", self.summary.frames);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Apply the outcome of one poll completed at `observed_at`.
    ///
    /// Returns the id of a track whose timeline should now be fetched.
    pub fn apply_poll(
        &mut self,
        result: Result<Option<PlaybackSnapshot>, SourceError>,
        observed_at: Instant,
    ) -> Option<String> {
        if !self.active {
            debug!("Ignoring poll result for inactive session");
            return None;
        }
        self.summary.polls += 1;

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Playback poll failed: {}", err);
                self.summary.poll_failures += 1;
                return None;
            }
        };

        let stopped = snapshot.is_none();
        let mut fetch = None;
        for signal in self.estimator.ingest_snapshot(snapshot, observed_at) {
            match signal {
                PlaybackSignal::TrackChanged { track_id, track } => {
                    self.summary.track_changes += 1;
                    self.dispatcher.clear();
                    self.timeline = None;
                    if let Some(track) = &track {
                        info!("Now playing: {} - {}", track.artist, track.name);
                    }
                    self.track = track;
                    fetch = (!track_id.is_empty()).then_some(track_id);
                }
                PlaybackSignal::PlayStateChanged(playing) => {
                    debug!("Playback {}", if playing { "resumed" } else { "paused" });
                }
                PlaybackSignal::Seeked { to_ms, .. } => {
                    self.summary.seeks += 1;
                    self.dispatcher.seek(to_ms);
                }
                PlaybackSignal::Resynced { drift_ms } => {
                    debug!("Resynced clock, drift {:.1}ms", drift_ms);
                }
            }
        }

        if stopped {
            self.dispatcher.clear();
            self.timeline = None;
            self.track = None;
        }
        fetch
    }

    /// Install the timeline fetched for `track_id`.
    ///
    /// Results for a track that is no longer current are discarded. A failed
    /// fetch leaves the session animating from bands alone.
    pub fn apply_timeline(&mut self, track_id: &str, result: Result<AnalysisResponse, SourceError>) {
        if !self.active {
            debug!("Ignoring timeline for inactive session");
            return;
        }
        if self.estimator.track_id() != Some(track_id) {
            debug!("Discarding timeline for stale track {}", track_id);
            return;
        }

        match result {
            Ok(analysis) => {
                self.dispatcher.load_timeline(analysis.to_timeline());
                self.timeline = Some(TimelineInfo {
                    duration: analysis.duration,
                    tempo: analysis.tempo,
                    energy: analysis.energy,
                });
                self.summary.timelines_loaded += 1;
            }
            Err(err) => {
                warn!("No cue timeline for {}: {}", track_id, err);
                self.dispatcher.clear();
                self.timeline = None;
                self.summary.timeline_failures += 1;
            }
        }
    }

    /// Advance one rendered frame.
    ///
    /// Ingests this frame's bands first so fired cues land on top of them:
    /// beats add to the band bass and segments override hue and energy. Each
    /// cue then goes to `listener`, and every channel is smoothed once.
    pub fn frame(&mut self, now: Instant, bands: Option<&[f32]>, listener: &mut dyn CueListener) -> ReactiveParameters {
        if !self.active {
            return self.engine.parameters();
        }

        if self.estimator.is_playing() && !self.dispatcher.is_empty() {
            let position = self.estimator.estimate_position(now);
            self.dispatcher.update(position, self.config.lookahead_ms);
        }

        self.engine.ingest_bands(bands, self.config.sensitivity);

        for fired in self.dispatcher.drain_fired() {
            self.summary.count_fired(fired.kind);
            self.engine.apply_cue(&fired.event).deliver(listener);
        }

        match self.config.smoothing_mode {
            SmoothingMode::PerTick => self.engine.tick(self.config.smoothing),
            SmoothingMode::FrameRateIndependent { reference_hz } => {
                let frames = match self.last_frame {
                    Some(last) => (now.saturating_duration_since(last).as_secs_f64() * reference_hz) as f32,
                    None => 1.0,
                };
                self.engine.tick_scaled(self.config.smoothing, frames);
            }
        }
        self.last_frame = Some(now);

        self.summary.frames += 1;
        if self.summary.frames % 600 == 0 {
            debug!(
                "Frame {}: position {:.0}ms, {} beats fired, {:?}",
                self.summary.frames,
                self.estimator.estimate_position(now),
                self.summary.beats_fired,
                self.engine.parameters()
            );
        }

        self.engine.parameters()
    }

    pub fn current_parameters(&self) -> ReactiveParameters {
        self.engine.parameters()
    }

    pub fn position_ms(&self, now: Instant) -> f64 {
        self.estimator.estimate_position(now)
    }

    pub fn is_playing(&self) -> bool {
        self.estimator.is_playing()
    }

    pub fn current_segment(&self, now: Instant) -> Option<&CueEvent> {
        self.dispatcher.current_segment(self.position_ms(now))
    }

    pub fn current_section(&self, now: Instant) -> Option<&CueEvent> {
        self.dispatcher.current_section(self.position_ms(now))
    }

    pub fn track(&self) -> Option<&TrackInfo> {
        self.track.as_ref()
    }

    pub fn timeline(&self) -> Option<TimelineInfo> {
        self.timeline
    }

    pub fn has_timeline(&self) -> bool {
        !self.dispatcher.is_empty()
    }

    pub fn engine(&self) -> &ReactiveParameterEngine {
        &self.engine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.config.set_sensitivity(sensitivity);
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            cues_dropped: self.dispatcher.dropped(),
            ..self.summary.clone()
        }
    }
}
