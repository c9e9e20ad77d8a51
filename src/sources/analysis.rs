use crate::effects::dominant_pitch;
use crate::error::SourceError;
use crate::sync::{CueEvent, CueTimeline, Mode, PITCH_CLASSES};
use log::debug;
use serde::{Deserialize, Serialize};

/// Beats at or below this confidence are dropped.
pub const MIN_BEAT_CONFIDENCE: f32 = 0.3;
/// Only the first segments are kept; the rest add size without visual value.
pub const MAX_SEGMENTS: usize = 2000;

const DEFAULT_SEGMENT_LOUDNESS: f32 = -60.0;
const DEFAULT_SECTION_TEMPO: f32 = 120.0;
const DEFAULT_SECTION_LOUDNESS: f32 = -10.0;
const DEFAULT_ENERGY: f32 = 0.5;

// Raw analysis as served by the remote API. Only the fields the visualizer
// reads are modelled.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAnalysis {
    pub track: RawTrackSummary,
    pub beats: Vec<RawBeat>,
    pub segments: Vec<RawSegment>,
    pub sections: Vec<RawSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrackSummary {
    pub duration: Option<f64>,
    pub tempo: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBeat {
    pub start: f64,
    pub duration: f64,
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSegment {
    pub start: f64,
    pub duration: f64,
    pub loudness_start: Option<f32>,
    pub loudness: Option<f32>,
    pub pitches: Option<Vec<f32>>,
    pub timbre: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSection {
    pub start: f64,
    pub duration: f64,
    pub tempo: Option<f32>,
    pub key: Option<i64>,
    pub mode: Option<i64>,
    pub loudness: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFeatures {
    pub tempo: Option<f32>,
    pub energy: Option<f32>,
}

// Processed analysis: what the session consumes and what timeline files hold.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatData {
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentData {
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    pub loudness: f32,
    pub pitches: Vec<f32>,
    pub timbre: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionData {
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    pub tempo: f32,
    /// Pitch class 0-11, -1 when unknown
    pub key: i64,
    /// 1 = major, 0 = minor
    pub mode: i64,
    pub loudness: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub track_id: String,
    pub duration: f64,
    pub tempo: f32,
    pub energy: f32,
    pub beats: Vec<BeatData>,
    pub segments: Vec<SegmentData>,
    pub sections: Vec<SectionData>,
}

/// Summary numbers printed by the cue tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisStats {
    pub beats: usize,
    pub segments: usize,
    pub sections: usize,
    pub average_tempo: f32,
    /// Pitch class that most often dominates a segment
    pub dominant_pitch: Option<usize>,
}

/// Trim and default a raw analysis down to what the visualizer uses.
pub fn process_analysis(track_id: &str, analysis: RawAnalysis, features: Option<RawFeatures>) -> AnalysisResponse {
    let raw_beats = analysis.beats.len();
    let beats: Vec<BeatData> = analysis
        .beats
        .into_iter()
        .filter(|beat| beat.confidence > MIN_BEAT_CONFIDENCE)
        .map(|beat| BeatData {
            start: beat.start,
            duration: beat.duration,
            confidence: beat.confidence,
        })
        .collect();
    debug!("Kept {} of {} beats above confidence {}", beats.len(), raw_beats, MIN_BEAT_CONFIDENCE);

    let segments = analysis
        .segments
        .into_iter()
        .take(MAX_SEGMENTS)
        .map(|segment| SegmentData {
            start: segment.start,
            duration: segment.duration,
            loudness: segment
                .loudness_start
                .or(segment.loudness)
                .unwrap_or(DEFAULT_SEGMENT_LOUDNESS),
            pitches: segment.pitches.unwrap_or_else(|| vec![0.0; PITCH_CLASSES]),
            timbre: segment.timbre.unwrap_or_else(|| vec![0.0; PITCH_CLASSES]),
        })
        .collect();

    let sections = analysis
        .sections
        .into_iter()
        .map(|section| SectionData {
            start: section.start,
            duration: section.duration,
            tempo: section.tempo.unwrap_or(DEFAULT_SECTION_TEMPO),
            key: section.key.unwrap_or(-1),
            mode: section.mode.unwrap_or(0),
            loudness: section.loudness.unwrap_or(DEFAULT_SECTION_LOUDNESS),
        })
        .collect();

    let features = features.unwrap_or_default();
    AnalysisResponse {
        track_id: track_id.to_string(),
        duration: analysis.track.duration.unwrap_or(0.0),
        tempo: features
            .tempo
            .or(analysis.track.tempo)
            .unwrap_or(DEFAULT_SECTION_TEMPO),
        energy: features.energy.unwrap_or(DEFAULT_ENERGY),
        beats,
        segments,
        sections,
    }
}

/// Trimmed id if it is 22 ASCII alphanumerics.
pub fn validate_track_id(track_id: &str) -> Result<String, SourceError> {
    let trimmed = track_id.trim();
    if trimmed.len() == 22 && trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(trimmed.to_string())
    } else {
        Err(SourceError::InvalidTrackId(track_id.to_string()))
    }
}

impl AnalysisResponse {
    /// Convert to dispatcher cues. Keys outside 0-11 become unknown.
    pub fn to_timeline(&self) -> CueTimeline {
        let beats = self
            .beats
            .iter()
            .map(|beat| CueEvent::beat(beat.start, beat.duration, beat.confidence))
            .collect();

        let segments = self
            .segments
            .iter()
            .map(|segment| {
                CueEvent::segment(
                    segment.start,
                    segment.duration,
                    segment.loudness,
                    segment.pitches.clone(),
                    segment.timbre.clone(),
                )
            })
            .collect();

        let sections = self
            .sections
            .iter()
            .map(|section| {
                let key = u8::try_from(section.key).ok().filter(|&key| (key as usize) < PITCH_CLASSES);
                CueEvent::section(
                    section.start,
                    section.duration,
                    section.tempo,
                    key,
                    Mode::from_raw(section.mode),
                    section.loudness,
                )
            })
            .collect();

        CueTimeline::new(beats, segments, sections)
    }

    pub fn stats(&self) -> AnalysisStats {
        let average_tempo = if self.sections.is_empty() {
            self.tempo
        } else {
            self.sections.iter().map(|section| section.tempo).sum::<f32>() / self.sections.len() as f32
        };

        let mut histogram = [0usize; PITCH_CLASSES];
        for segment in &self.segments {
            if let Some(pitch) = dominant_pitch(&segment.pitches) {
                histogram[pitch] += 1;
            }
        }
        let dominant_pitch = histogram
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .fold(None, |best: Option<(usize, usize)>, (pitch, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((pitch, count)),
            })
            .map(|(pitch, _)| pitch);

        AnalysisStats {
            beats: self.beats.len(),
            segments: self.segments.len(),
            sections: self.sections.len(),
            average_tempo,
            dominant_pitch,
        }
    }
}
