use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How the reactive channels are advanced between frames.
///
/// `PerTick` applies the smoothing and decay factors once per rendered frame,
/// so faster displays converge faster in wall-clock time. `FrameRateIndependent`
/// rescales both factors by the elapsed time relative to `reference_hz`, which
/// reproduces `PerTick` exactly when frames arrive at the reference rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SmoothingMode {
    PerTick,
    FrameRateIndependent { reference_hz: f64 },
}

impl Default for SmoothingMode {
    fn default() -> Self {
        SmoothingMode::PerTick
    }
}

/// Weights and limits for mapping cues and bands onto reactive channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactiveConfig {
    /// Global multiplier on beat kicks
    pub reactivity: f32,
    /// Bass target increase for a beat of confidence 1.0
    pub beat_increment: f32,
    /// Bass target never climbs above this through beat accumulation
    pub beat_ceiling: f32,

    // energy = bass * w0 + mid * w1 + high * w2
    pub energy_weights: [f32; 3],

    /// Hue (degrees) for a silent mid band
    pub hue_floor: f32,
    /// Degrees swept as the mid band goes from 0.0 to 1.0
    pub hue_span: f32,

    /// Per-tick multiplicative decay of the bass target
    pub bass_decay: f32,
    /// Per-tick multiplicative decay of the energy target
    pub energy_decay: f32,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            reactivity: 1.0,
            beat_increment: 0.4,
            beat_ceiling: 1.0,
            energy_weights: [0.5, 0.3, 0.2],
            hue_floor: 0.0,
            hue_span: 360.0,
            bass_decay: 0.95,
            energy_decay: 0.96,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.spotify.com/v1".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Everything a visualization session needs to know up front.
///
/// Loaded from JSON (all fields optional) and then overridden from the
/// command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub poll_interval_ms: u64,
    pub frame_rate: f64,
    pub lookahead_ms: f64,
    /// Fraction of the remaining distance kept each tick (0.0 snaps, 0.99 crawls)
    pub smoothing: f32,
    pub smoothing_mode: SmoothingMode,
    pub sensitivity: f32,
    /// Snapshot corrections larger than this are treated as a user seek
    pub seek_threshold_ms: f64,
    pub event_queue_capacity: usize,
    pub cache_max_age_hours: u64,
    pub reactive: ReactiveConfig,
    pub remote: RemoteConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            frame_rate: 60.0,
            lookahead_ms: 50.0,
            smoothing: 0.85,
            smoothing_mode: SmoothingMode::PerTick,
            sensitivity: 1.0,
            seek_threshold_ms: 1500.0,
            event_queue_capacity: 256,
            cache_max_age_hours: 24 * 7,
            reactive: ReactiveConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let mut config: SessionConfig = serde_json::from_str(&json)?;
        config.sensitivity = config.sensitivity.clamp(0.1, 5.0);
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be positive");
        }
        if !(self.frame_rate > 0.0) {
            bail!("frame_rate must be positive, got {}", self.frame_rate);
        }
        if !(self.lookahead_ms >= 0.0) {
            bail!("lookahead_ms must not be negative, got {}", self.lookahead_ms);
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            bail!("smoothing must be in [0, 1), got {}", self.smoothing);
        }
        if !(self.seek_threshold_ms > 0.0) {
            bail!("seek_threshold_ms must be positive");
        }
        if self.event_queue_capacity == 0 {
            bail!("event_queue_capacity must be positive");
        }
        if let SmoothingMode::FrameRateIndependent { reference_hz } = self.smoothing_mode {
            if !(reference_hz > 0.0) {
                bail!("reference_hz must be positive, got {}", reference_hz);
            }
        }
        for (name, decay) in [
            ("bass_decay", self.reactive.bass_decay),
            ("energy_decay", self.reactive.energy_decay),
        ] {
            if !(decay > 0.0 && decay <= 1.0) {
                bail!("{} must be in (0, 1], got {}", name, decay);
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_hours * 3600)
    }

    /// Set sensitivity (0.1 = very low, 5.0 = very high)
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity.clamp(0.1, 5.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), Duration::from_millis(3000));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "lookahead_ms": 80, "reactive": { "beat_ceiling": 1.5 } }"#).unwrap();
        assert_eq!(config.lookahead_ms, 80.0);
        assert_eq!(config.reactive.beat_ceiling, 1.5);
        assert_eq!(config.reactive.bass_decay, 0.95);
        assert_eq!(config.poll_interval_ms, 3000);
        assert_eq!(config.smoothing_mode, SmoothingMode::PerTick);
    }

    #[test]
    fn smoothing_mode_round_trips_through_json() {
        let config: SessionConfig = serde_json::from_str(
            r#"{ "smoothing_mode": { "mode": "frame_rate_independent", "reference_hz": 60.0 } }"#,
        )
        .unwrap();
        assert_eq!(
            config.smoothing_mode,
            SmoothingMode::FrameRateIndependent { reference_hz: 60.0 }
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = SessionConfig::default();
        config.smoothing = 1.0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.reactive.energy_decay = 1.2;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.frame_rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut config = SessionConfig::default();
        config.lookahead_ms = 120.0;
        config.set_sensitivity(9.0);
        config.save(&path).unwrap();

        let loaded = SessionConfig::load(&path).unwrap();
        assert_eq!(loaded.lookahead_ms, 120.0);
        assert_eq!(loaded.sensitivity, 5.0);
    }
}
