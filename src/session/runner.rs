use super::{SessionSummary, VisualizerSession};
use crate::audio::{BandSampler, SilentSampler};
use crate::config::SessionConfig;
use crate::error::SourceError;
use crate::sources::{AnalysisResponse, CueProvider, SnapshotSource};
use crate::sync::PlaybackSnapshot;
use crate::ui::RenderConsumer;
use anyhow::Result;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

pub type PollOutcome = Result<Option<PlaybackSnapshot>, SourceError>;

/// Results delivered to the session task from the poll and fetch tasks.
#[derive(Debug)]
pub enum SessionEvent {
    Poll {
        result: PollOutcome,
        observed_at: Instant,
    },
    Timeline {
        track_id: String,
        result: Result<AnalysisResponse, SourceError>,
    },
}

/// Drives a `VisualizerSession` on the tokio runtime.
///
/// The session itself is owned by the task calling `run`; polling and timeline
/// fetches happen on spawned tasks and report back over a channel, so every
/// state change is applied between frames.
pub struct SessionRunner {
    session: VisualizerSession,
    provider: Arc<dyn CueProvider>,
    sampler: Box<dyn BandSampler>,
    time_limit: Option<Duration>,
}

impl SessionRunner {
    pub fn new(config: SessionConfig, provider: Arc<dyn CueProvider>) -> Self {
        Self {
            session: VisualizerSession::new(config),
            provider,
            sampler: Box::new(SilentSampler),
            time_limit: None,
        }
    }

    pub fn with_sampler(mut self, sampler: Box<dyn BandSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Stop on its own after `limit` instead of waiting for Ctrl-C.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub async fn run<S, C>(mut self, source: S, consumer: &mut C) -> Result<SessionSummary>
    where
        S: SnapshotSource + 'static,
        C: RenderConsumer,
    {
        let config = self.session.config().clone();
        let (tx, mut rx) = mpsc::channel::<SessionEvent>(32);

        self.session.start();
        let poll_task = tokio::spawn(poll_loop(source, config.poll_interval(), tx.clone()));

        let mut frames = tokio::time::interval(config.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let time_limit = self.time_limit;
        let deadline = async move {
            match time_limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let shutdown = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for Ctrl-C: {}", err);
                std::future::pending::<()>().await;
            }
        };
        tokio::pin!(shutdown);

        info!(
            "Running at {:.0} fps, polling every {}ms",
            config.frame_rate, config.poll_interval_ms
        );

        loop {
            tokio::select! {
                _ = frames.tick() => {
                    let now = Instant::now();
                    let bands = self.sampler.sample();
                    let params = self.session.frame(now, bands, consumer);
                    consumer.render(&params, &self.session, now);
                }
                Some(event) = rx.recv() => match event {
                    SessionEvent::Poll { result, observed_at } => {
                        if let Some(track_id) = self.session.apply_poll(result, observed_at) {
                            self.spawn_fetch(track_id, tx.clone());
                        }
                    }
                    SessionEvent::Timeline { track_id, result } => {
                        self.session.apply_timeline(&track_id, result);
                    }
                },
                _ = &mut shutdown => {
                    info!("Ctrl-C received, stopping");
                    break;
                }
                _ = &mut deadline => {
                    info!("Time limit reached, stopping");
                    break;
                }
            }
        }

        poll_task.abort();
        self.session.stop();
        Ok(self.session.summary())
    }

    fn spawn_fetch(&self, track_id: String, tx: mpsc::Sender<SessionEvent>) {
        let provider = Arc::clone(&self.provider);
        debug!("Fetching cue timeline for {}", track_id);
        tokio::spawn(async move {
            let result = provider.fetch_timeline(&track_id).await;
            // The session may be gone by now; that is fine
            let _ = tx.send(SessionEvent::Timeline { track_id, result }).await;
        });
    }
}

async fn poll_loop<S: SnapshotSource>(mut source: S, period: Duration, tx: mpsc::Sender<SessionEvent>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let result = source.poll().await;
        let observed_at = Instant::now();
        let result = result.map(|state| state.map(|state| state.into_snapshot(observed_at)));
        if tx.send(SessionEvent::Poll { result, observed_at }).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{CueListener, ReactiveParameters};
    use crate::sources::analysis::BeatData;
    use crate::sources::{LocalClockSource, TrackInfo};
    use async_trait::async_trait;

    struct FixedProvider;

    #[async_trait]
    impl CueProvider for FixedProvider {
        async fn fetch_timeline(&self, track_id: &str) -> Result<AnalysisResponse, SourceError> {
            Ok(AnalysisResponse {
                track_id: track_id.to_string(),
                duration: 10.0,
                tempo: 120.0,
                energy: 0.5,
                beats: [0.1, 0.2, 0.3]
                    .iter()
                    .map(|&start| BeatData {
                        start,
                        duration: 0.5,
                        confidence: 0.8,
                    })
                    .collect(),
                segments: Vec::new(),
                sections: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct CountingConsumer {
        beats: usize,
        renders: usize,
    }

    impl CueListener for CountingConsumer {
        fn on_beat(&mut self, _confidence: f32) {
            self.beats += 1;
        }
    }

    impl RenderConsumer for CountingConsumer {
        fn render(&mut self, _params: &ReactiveParameters, _session: &VisualizerSession, _now: Instant) {
            self.renders += 1;
        }
    }

    #[tokio::test]
    async fn runs_until_time_limit_and_fires_timeline_cues() {
        let config = SessionConfig {
            poll_interval_ms: 100,
            frame_rate: 100.0,
            ..SessionConfig::default()
        };
        let track = TrackInfo {
            id: "demo".to_string(),
            name: "Demo".to_string(),
            artist: "Nobody".to_string(),
            album: "Nowhere".to_string(),
            album_art: None,
            duration_ms: 10_000,
        };

        let runner = SessionRunner::new(config, Arc::new(FixedProvider)).with_time_limit(Duration::from_millis(1200));
        let mut consumer = CountingConsumer::default();
        let summary = runner.run(LocalClockSource::new(track), &mut consumer).await.unwrap();

        assert_eq!(summary.timelines_loaded, 1);
        assert_eq!(summary.track_changes, 1);
        assert_eq!(summary.beats_fired, 3);
        assert_eq!(consumer.beats, 3);
        assert!(consumer.renders > 10);
        assert!(summary.polls >= 2);
    }
}
