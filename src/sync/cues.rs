use log::warn;
use serde::{Deserialize, Serialize};

/// Length of the pitch and timbre vectors carried by segment cues.
pub const PITCH_CLASSES: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueKind {
    Beat,
    Segment,
    Section,
}

impl CueKind {
    pub const ALL: [CueKind; 3] = [CueKind::Beat, CueKind::Segment, CueKind::Section];

    pub fn label(self) -> &'static str {
        match self {
            CueKind::Beat => "beat",
            CueKind::Segment => "segment",
            CueKind::Section => "section",
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            CueKind::Beat => 0,
            CueKind::Segment => 1,
            CueKind::Section => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    /// Analysis data encodes mode as 1 = major, anything else = minor.
    pub fn from_raw(raw: i64) -> Self {
        if raw == 1 {
            Mode::Major
        } else {
            Mode::Minor
        }
    }
}

/// Channel-specific data carried by a cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CuePayload {
    Beat {
        confidence: f32,
    },
    Segment {
        loudness_db: f32,
        pitches: Vec<f32>,
        timbre: Vec<f32>,
    },
    Section {
        tempo: f32,
        /// Pitch class 0-11, `None` when the analysis could not detect a key
        key: Option<u8>,
        mode: Mode,
        loudness_db: f32,
    },
}

/// A timestamped event from a precomputed analysis timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueEvent {
    /// Seconds from the start of the track
    pub start: f64,
    /// Seconds; zero for instantaneous cues
    pub duration: f64,
    pub payload: CuePayload,
}

impl CueEvent {
    pub fn beat(start: f64, duration: f64, confidence: f32) -> Self {
        Self {
            start,
            duration,
            payload: CuePayload::Beat { confidence },
        }
    }

    pub fn segment(start: f64, duration: f64, loudness_db: f32, pitches: Vec<f32>, timbre: Vec<f32>) -> Self {
        Self {
            start,
            duration,
            payload: CuePayload::Segment {
                loudness_db,
                pitches,
                timbre,
            },
        }
    }

    pub fn section(start: f64, duration: f64, tempo: f32, key: Option<u8>, mode: Mode, loudness_db: f32) -> Self {
        Self {
            start,
            duration,
            payload: CuePayload::Section {
                tempo,
                key,
                mode,
                loudness_db,
            },
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn kind(&self) -> CueKind {
        match self.payload {
            CuePayload::Beat { .. } => CueKind::Beat,
            CuePayload::Segment { .. } => CueKind::Segment,
            CuePayload::Section { .. } => CueKind::Section,
        }
    }
}

/// The three cue sequences of one track, each sorted by start time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CueTimeline {
    sequences: [Vec<CueEvent>; 3],
}

impl CueTimeline {
    /// Build a timeline, repairing sequences that arrive out of order.
    ///
    /// Events with a non-finite start are dropped, negative times are clamped
    /// to zero and an unsorted sequence is stable-sorted so ties keep their
    /// input order.
    pub fn new(beats: Vec<CueEvent>, segments: Vec<CueEvent>, sections: Vec<CueEvent>) -> Self {
        Self {
            sequences: [
                Self::sanitize(CueKind::Beat, beats),
                Self::sanitize(CueKind::Segment, segments),
                Self::sanitize(CueKind::Section, sections),
            ],
        }
    }

    pub fn events(&self, kind: CueKind) -> &[CueEvent] {
        &self.sequences[kind.slot()]
    }

    pub fn len(&self) -> usize {
        self.sequences.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.iter().all(Vec::is_empty)
    }

    pub fn into_sequences(self) -> [Vec<CueEvent>; 3] {
        self.sequences
    }

    fn sanitize(kind: CueKind, events: Vec<CueEvent>) -> Vec<CueEvent> {
        let before = events.len();
        let mut events: Vec<CueEvent> = events
            .into_iter()
            .filter(|event| event.start.is_finite())
            .map(|mut event| {
                event.start = event.start.max(0.0);
                event.duration = if event.duration.is_finite() { event.duration.max(0.0) } else { 0.0 };
                event
            })
            .collect();

        if events.len() != before {
            warn!("Dropped {} {} cues with invalid start times", before - events.len(), kind.label());
        }

        if events.windows(2).any(|pair| pair[0].start > pair[1].start) {
            warn!("{} cues arrived unsorted; sorting by start time", kind.label());
            events.sort_by(|a, b| a.start.total_cmp(&b.start));
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsorted_sequences_are_stably_sorted() {
        let beats = vec![
            CueEvent::beat(1.0, 0.0, 0.1),
            CueEvent::beat(0.5, 0.0, 0.2),
            CueEvent::beat(1.0, 0.0, 0.3),
        ];
        let timeline = CueTimeline::new(beats, Vec::new(), Vec::new());
        let confidences: Vec<f32> = timeline
            .events(CueKind::Beat)
            .iter()
            .map(|event| match event.payload {
                CuePayload::Beat { confidence } => confidence,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(confidences, vec![0.2, 0.1, 0.3]);
    }

    #[test]
    fn invalid_times_are_repaired_or_dropped() {
        let beats = vec![
            CueEvent::beat(f64::NAN, 0.1, 0.5),
            CueEvent::beat(-0.2, f64::INFINITY, 0.5),
            CueEvent::beat(0.3, -1.0, 0.5),
        ];
        let timeline = CueTimeline::new(beats, Vec::new(), Vec::new());
        let events = timeline.events(CueKind::Beat);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start, 0.0);
        assert_eq!(events[0].duration, 0.0);
        assert_eq!(events[1].duration, 0.0);
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let event = CueEvent::section(10.0, 20.0, 128.0, Some(5), Mode::Major, -7.5);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["kind"], "section");
        assert_eq!(json["payload"]["mode"], "major");
        assert_eq!(event.kind(), CueKind::Section);
        assert_eq!(Mode::from_raw(0), Mode::Minor);
    }
}
