use crate::config::ReactiveConfig;
use crate::sync::{CueEvent, CuePayload, Mode, PITCH_CLASSES};
use log::debug;
use serde::{Deserialize, Serialize};

/// A smoothed scalar: `current` chases `target` once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReactiveChannel {
    pub current: f32,
    pub target: f32,
}

impl ReactiveChannel {
    /// Move `current` toward `target`, keeping `retain` of the remaining gap.
    fn approach(&mut self, retain: f32) {
        self.current += (self.target - self.current) * (1.0 - retain);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Energy,
    Bass,
    Mid,
    High,
    Hue,
}

impl Channel {
    pub const ALL: [Channel; 5] = [Channel::Energy, Channel::Bass, Channel::Mid, Channel::High, Channel::Hue];

    fn slot(self) -> usize {
        match self {
            Channel::Energy => 0,
            Channel::Bass => 1,
            Channel::Mid => 2,
            Channel::High => 3,
            Channel::Hue => 4,
        }
    }
}

/// The per-tick view handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReactiveParameters {
    pub energy: f32,
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    /// Degrees
    pub hue: f32,
}

/// What a segment cue means visually.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentMapping {
    /// Index of the strongest pitch class, if the pitch vector was usable
    pub dominant_pitch: Option<usize>,
    pub hue: Option<f32>,
    pub energy: Option<f32>,
    pub loudness_db: f32,
    pub timbre: Vec<f32>,
}

impl SegmentMapping {
    pub fn from_cue(loudness_db: f32, pitches: &[f32], timbre: &[f32]) -> Self {
        let dominant_pitch = dominant_pitch(pitches);
        let hue = dominant_pitch.map(|index| index as f32 / PITCH_CLASSES as f32 * 360.0);
        let energy = loudness_db
            .is_finite()
            .then(|| ((loudness_db + 60.0) / 60.0).clamp(0.0, 1.0));

        Self {
            dominant_pitch,
            hue,
            energy,
            loudness_db,
            timbre: timbre.to_vec(),
        }
    }
}

/// Song-structure context from the most recent section cue.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionMood {
    pub tempo: f32,
    pub key: Option<u8>,
    pub mode: Mode,
    pub loudness_db: f32,
    /// Loudness normalized the same way as segment energy
    pub energy: f32,
}

/// A fired cue after mapping, as delivered to the render consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum CueNotice {
    Beat { confidence: f32 },
    Segment(SegmentMapping),
    Section(SectionMood),
}

impl CueNotice {
    pub fn deliver(&self, listener: &mut dyn CueListener) {
        match self {
            CueNotice::Beat { confidence } => listener.on_beat(*confidence),
            CueNotice::Segment(segment) => listener.on_segment(segment),
            CueNotice::Section(section) => listener.on_section(section),
        }
    }
}

/// Receives discrete cue notices drained from the dispatcher once per frame.
pub trait CueListener {
    fn on_beat(&mut self, _confidence: f32) {}
    fn on_segment(&mut self, _segment: &SegmentMapping) {}
    fn on_section(&mut self, _section: &SectionMood) {}
}

/// Listener that ignores everything.
pub struct NullListener;

impl CueListener for NullListener {}

/// Index of the strongest of twelve finite pitch classes; ties go to the lowest.
pub fn dominant_pitch(pitches: &[f32]) -> Option<usize> {
    if pitches.len() != PITCH_CLASSES || pitches.iter().any(|p| !p.is_finite()) {
        return None;
    }
    pitches
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (index, &value)| match best {
            Some((_, best_value)) if best_value >= value => best,
            _ => Some((index, value)),
        })
        .map(|(index, _)| index)
}

fn average_range(data: &[f32], start: usize, end: usize) -> f32 {
    if start >= end || start >= data.len() {
        return 0.0;
    }
    let end = end.min(data.len());
    let sum: f32 = data[start..end].iter().sum();
    sum / (end - start) as f32
}

/// Merges cue events and band samples into smoothed animation parameters.
pub struct ReactiveParameterEngine {
    channels: [ReactiveChannel; 5],
    config: ReactiveConfig,
    section: Option<SectionMood>,
}

impl ReactiveParameterEngine {
    pub fn new(config: ReactiveConfig) -> Self {
        Self {
            channels: [ReactiveChannel::default(); 5],
            config,
            section: None,
        }
    }

    /// Back to the state of a freshly started session.
    pub fn reset(&mut self) {
        self.channels = [ReactiveChannel::default(); 5];
        self.section = None;
    }

    pub fn channel(&self, channel: Channel) -> ReactiveChannel {
        self.channels[channel.slot()]
    }

    fn target_mut(&mut self, channel: Channel) -> &mut f32 {
        &mut self.channels[channel.slot()].target
    }

    /// Set band targets from one frame of normalized frequency bins.
    ///
    /// Bass is the first 10% of the bins, mid the next 40% and high the rest.
    /// An absent or empty frame leaves every target alone.
    pub fn ingest_bands(&mut self, bins: Option<&[f32]>, sensitivity: f32) {
        let bins = match bins {
            Some(bins) if !bins.is_empty() => bins,
            _ => return,
        };

        let len = bins.len();
        let bass_end = ((len as f32 * 0.1).round() as usize).clamp(1, len);
        let mid_end = ((len as f32 * 0.5).round() as usize).clamp(bass_end, len);

        let bass = average_range(bins, 0, bass_end) * sensitivity;
        let mid = average_range(bins, bass_end, mid_end) * sensitivity;
        let high = average_range(bins, mid_end, len) * sensitivity;

        let [w_bass, w_mid, w_high] = self.config.energy_weights;
        *self.target_mut(Channel::Bass) = bass;
        *self.target_mut(Channel::Mid) = mid;
        *self.target_mut(Channel::High) = high;
        *self.target_mut(Channel::Energy) = bass * w_bass + mid * w_mid + high * w_high;
        // Hue stays inside its range even when sensitivity pushes mid past 1
        *self.target_mut(Channel::Hue) = self.config.hue_floor + mid.clamp(0.0, 1.0) * self.config.hue_span;
    }

    /// Kick the bass target. Beats accumulate up to the configured ceiling.
    pub fn on_beat(&mut self, confidence: f32) {
        if !confidence.is_finite() {
            return;
        }
        let kick = confidence.clamp(0.0, 1.0) * self.config.reactivity * self.config.beat_increment;
        let ceiling = self.config.beat_ceiling;
        let bass = self.target_mut(Channel::Bass);
        *bass = (*bass + kick).min(ceiling.max(*bass));
    }

    /// Hue from the dominant pitch class, energy from loudness. Either half is
    /// skipped when its input is unusable.
    pub fn on_segment_cue(&mut self, loudness_db: f32, pitches: &[f32], timbre: &[f32]) -> SegmentMapping {
        let mapping = SegmentMapping::from_cue(loudness_db, pitches, timbre);
        match mapping.hue {
            Some(hue) => *self.target_mut(Channel::Hue) = hue,
            None => debug!("Segment without a usable pitch vector ({} entries)", pitches.len()),
        }
        if let Some(energy) = mapping.energy {
            *self.target_mut(Channel::Energy) = energy;
        }
        mapping
    }

    /// Records the section context. No channel is driven by it.
    pub fn on_section_cue(&mut self, tempo: f32, key: Option<u8>, mode: Mode, loudness_db: f32) -> SectionMood {
        let energy = if loudness_db.is_finite() {
            ((loudness_db + 60.0) / 60.0).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mood = SectionMood {
            tempo,
            key,
            mode,
            loudness_db,
            energy,
        };
        self.section = Some(mood.clone());
        mood
    }

    /// Route a fired cue to the matching handler.
    pub fn apply_cue(&mut self, event: &CueEvent) -> CueNotice {
        match &event.payload {
            CuePayload::Beat { confidence } => {
                self.on_beat(*confidence);
                CueNotice::Beat { confidence: *confidence }
            }
            CuePayload::Segment {
                loudness_db,
                pitches,
                timbre,
            } => CueNotice::Segment(self.on_segment_cue(*loudness_db, pitches, timbre)),
            CuePayload::Section {
                tempo,
                key,
                mode,
                loudness_db,
            } => CueNotice::Section(self.on_section_cue(*tempo, *key, *mode, *loudness_db)),
        }
    }

    /// One smoothing step per rendered frame, then decay the bass and energy
    /// targets so they fall back toward zero without fresh input.
    pub fn tick(&mut self, smoothing: f32) {
        self.advance(smoothing.clamp(0.0, 1.0), self.config.bass_decay, self.config.energy_decay);
    }

    /// Like `tick`, but scaled to `frames` reference frames worth of elapsed
    /// time. `frames == 1.0` is identical to `tick`.
    pub fn tick_scaled(&mut self, smoothing: f32, frames: f32) {
        let frames = frames.max(0.0);
        let retain = smoothing.clamp(0.0, 1.0).powf(frames);
        let bass_decay = self.config.bass_decay.powf(frames);
        let energy_decay = self.config.energy_decay.powf(frames);
        self.advance(retain, bass_decay, energy_decay);
    }

    fn advance(&mut self, retain: f32, bass_decay: f32, energy_decay: f32) {
        for channel in &mut self.channels {
            channel.approach(retain);
        }
        *self.target_mut(Channel::Bass) *= bass_decay;
        *self.target_mut(Channel::Energy) *= energy_decay;
    }

    pub fn parameters(&self) -> ReactiveParameters {
        ReactiveParameters {
            energy: self.channel(Channel::Energy).current,
            bass: self.channel(Channel::Bass).current,
            mid: self.channel(Channel::Mid).current,
            high: self.channel(Channel::High).current,
            hue: self.channel(Channel::Hue).current,
        }
    }

    pub fn section(&self) -> Option<&SectionMood> {
        self.section.as_ref()
    }

    pub fn config(&self) -> &ReactiveConfig {
        &self.config
    }
}

impl Default for ReactiveParameterEngine {
    fn default() -> Self {
        Self::new(ReactiveConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ReactiveParameterEngine {
        ReactiveParameterEngine::default()
    }

    #[test]
    fn bands_split_ten_forty_fifty() {
        let mut engine = engine();
        let mut bins = vec![0.0; 100];
        bins[..10].iter_mut().for_each(|b| *b = 1.0);
        bins[10..50].iter_mut().for_each(|b| *b = 0.5);
        bins[50..].iter_mut().for_each(|b| *b = 0.25);

        engine.ingest_bands(Some(&bins), 1.0);

        assert_eq!(engine.channel(Channel::Bass).target, 1.0);
        assert_eq!(engine.channel(Channel::Mid).target, 0.5);
        assert_eq!(engine.channel(Channel::High).target, 0.25);
        let energy = engine.channel(Channel::Energy).target;
        assert!((energy - (0.5 + 0.15 + 0.05)).abs() < 1e-6);
        assert!((engine.channel(Channel::Hue).target - 180.0).abs() < 1e-4);
        // Targets only; nothing moves until a tick
        assert_eq!(engine.parameters(), ReactiveParameters::default());
    }

    #[test]
    fn sensitivity_scales_bands_without_saturating() {
        let mut engine = engine();
        let bins = vec![0.4; 20];
        engine.ingest_bands(Some(&bins), 2.0);
        assert!((engine.channel(Channel::Mid).target - 0.8).abs() < 1e-6);

        engine.ingest_bands(Some(&bins), 5.0);
        assert!((engine.channel(Channel::Bass).target - 2.0).abs() < 1e-6);
        assert!((engine.channel(Channel::High).target - 2.0).abs() < 1e-6);
        // Louder input still reads louder at high sensitivity
        engine.ingest_bands(Some(&[0.3; 20]), 5.0);
        assert!((engine.channel(Channel::Bass).target - 1.5).abs() < 1e-6);
        // Hue is bounded by its span
        assert!((engine.channel(Channel::Hue).target - 360.0).abs() < 1e-4);
    }

    #[test]
    fn missing_bands_leave_targets_to_decay() {
        let mut engine = engine();
        engine.ingest_bands(Some(&[1.0; 10]), 1.0);
        let before = engine.channel(Channel::Bass).target;
        engine.ingest_bands(None, 1.0);
        engine.ingest_bands(Some(&[]), 1.0);
        assert_eq!(engine.channel(Channel::Bass).target, before);
        engine.tick(0.5);
        assert!(engine.channel(Channel::Bass).target < before);
    }

    #[test]
    fn beats_accumulate_up_to_ceiling() {
        let mut engine = engine();
        engine.on_beat(0.5);
        assert!((engine.channel(Channel::Bass).target - 0.2).abs() < 1e-6);
        engine.on_beat(0.5);
        assert!((engine.channel(Channel::Bass).target - 0.4).abs() < 1e-6);
        for _ in 0..10 {
            engine.on_beat(1.0);
        }
        assert_eq!(engine.channel(Channel::Bass).target, 1.0);
        engine.on_beat(f32::NAN);
        assert_eq!(engine.channel(Channel::Bass).target, 1.0);
    }

    #[test]
    fn segment_sets_hue_from_dominant_pitch_and_energy_from_loudness() {
        let mut engine = engine();
        let mut pitches = vec![0.1; 12];
        pitches[3] = 0.9;
        let mapping = engine.on_segment_cue(-30.0, &pitches, &[0.0; 12]);
        assert_eq!(mapping.dominant_pitch, Some(3));
        assert!((engine.channel(Channel::Hue).target - 90.0).abs() < 1e-4);
        assert!((engine.channel(Channel::Energy).target - 0.5).abs() < 1e-6);

        engine.on_segment_cue(-80.0, &pitches, &[]);
        assert_eq!(engine.channel(Channel::Energy).target, 0.0);
        engine.on_segment_cue(10.0, &pitches, &[]);
        assert_eq!(engine.channel(Channel::Energy).target, 1.0);
    }

    #[test]
    fn malformed_pitch_vector_leaves_hue_unchanged() {
        let mut engine = engine();
        let mut pitches = vec![0.0; 12];
        pitches[6] = 1.0;
        engine.on_segment_cue(-20.0, &pitches, &[]);
        let hue = engine.channel(Channel::Hue).target;

        let mapping = engine.on_segment_cue(-20.0, &[], &[]);
        assert_eq!(mapping.dominant_pitch, None);
        assert_eq!(engine.channel(Channel::Hue).target, hue);

        engine.on_segment_cue(-20.0, &[f32::NAN; 12], &[]);
        assert_eq!(engine.channel(Channel::Hue).target, hue);
    }

    #[test]
    fn dominant_pitch_prefers_first_on_ties() {
        let mut pitches = vec![0.0; 12];
        pitches[2] = 1.0;
        pitches[9] = 1.0;
        assert_eq!(dominant_pitch(&pitches), Some(2));
    }

    #[test]
    fn section_is_recorded_without_touching_channels() {
        let mut engine = engine();
        let notice = engine.apply_cue(&CueEvent::section(0.0, 30.0, 124.0, Some(9), Mode::Minor, -6.0));
        assert!(matches!(notice, CueNotice::Section(_)));
        let mood = engine.section().unwrap();
        assert_eq!(mood.key, Some(9));
        assert!((mood.energy - 0.9).abs() < 1e-6);
        for channel in Channel::ALL {
            assert_eq!(engine.channel(channel), ReactiveChannel::default());
        }
    }

    #[test]
    fn smoothing_converges_without_overshoot() {
        for smoothing in [0.0, 0.3, 0.85, 0.95] {
            let mut engine = ReactiveParameterEngine::new(ReactiveConfig {
                bass_decay: 1.0,
                energy_decay: 1.0,
                ..ReactiveConfig::default()
            });
            engine.ingest_bands(Some(&[0.8; 50]), 1.0);
            let target = engine.channel(Channel::Mid).target;

            let mut ticks = 0;
            while (target - engine.channel(Channel::Mid).current).abs() > 1e-3 {
                engine.tick(smoothing);
                assert!(engine.channel(Channel::Mid).current <= target + 1e-6);
                ticks += 1;
                assert!(ticks < 500, "no convergence at smoothing {}", smoothing);
            }
        }
    }

    #[test]
    fn targets_decay_toward_zero_without_input() {
        let mut engine = engine();
        engine.on_beat(1.0);
        engine.on_segment_cue(0.0, &[0.0; 12], &[]);
        for _ in 0..120 {
            engine.tick(0.8);
        }
        assert!(engine.channel(Channel::Bass).target < 0.01);
        assert!(engine.channel(Channel::Energy).target < 0.01);
        assert!(engine.parameters().bass < 0.05);
    }

    #[test]
    fn scaled_tick_matches_tick_at_one_frame() {
        let mut a = engine();
        let mut b = engine();
        for e in [&mut a, &mut b] {
            e.on_beat(1.0);
            e.ingest_bands(Some(&[0.6; 30]), 1.0);
        }
        a.tick(0.85);
        b.tick_scaled(0.85, 1.0);
        let (pa, pb) = (a.parameters(), b.parameters());
        assert!((pa.bass - pb.bass).abs() < 1e-6);
        assert!((pa.hue - pb.hue).abs() < 1e-4);

        // Two half-frames land where one full frame does
        let mut c = engine();
        c.on_beat(1.0);
        c.ingest_bands(Some(&[0.6; 30]), 1.0);
        c.tick_scaled(0.85, 0.5);
        c.tick_scaled(0.85, 0.5);
        assert!((c.channel(Channel::Mid).current - a.channel(Channel::Mid).current).abs() < 1e-5);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut engine = engine();
        engine.on_beat(1.0);
        engine.tick(0.0);
        engine.on_section_cue(120.0, None, Mode::Major, -5.0);
        engine.reset();
        assert_eq!(engine.parameters(), ReactiveParameters::default());
        assert!(engine.section().is_none());
    }
}
