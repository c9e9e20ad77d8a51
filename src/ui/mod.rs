use crate::effects::{CueListener, ReactiveParameters, SectionMood, SegmentMapping};
use crate::session::VisualizerSession;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::time::Instant;

const PITCH_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
const RECENT_CUES: usize = 6;
const BAR_WIDTH: usize = 20;

/// The renderer side of a session: receives fired cues through
/// [`CueListener`] and reads the parameters once per frame.
pub trait RenderConsumer: CueListener {
    fn render(&mut self, params: &ReactiveParameters, session: &VisualizerSession, now: Instant);
}

/// Prints the reactive state as a box of bars every `every` frames.
pub struct TerminalOverlay {
    every: u32,
    frame_count: u32,
    recent: VecDeque<String>,
    beats_seen: u64,
}

impl TerminalOverlay {
    /// `every == 0` keeps the overlay quiet.
    pub fn new(every: u32) -> Self {
        Self {
            every,
            frame_count: 0,
            recent: VecDeque::with_capacity(RECENT_CUES),
            beats_seen: 0,
        }
    }

    fn remember(&mut self, line: String) {
        if self.recent.len() == RECENT_CUES {
            self.recent.pop_front();
        }
        self.recent.push_back(line);
    }

    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    fn bar(value: f32) -> String {
        "█".repeat((value.clamp(0.0, 1.0) * BAR_WIDTH as f32) as usize)
    }

    pub fn format_frame(&self, params: &ReactiveParameters, session: &VisualizerSession, now: Instant) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "╔═══════════════════════════════════════════════════╗");
        let _ = writeln!(out, "║  CUESYNC                                           ");
        let _ = writeln!(out, "╠═══════════════════════════════════════════════════╣");

        match session.track() {
            Some(track) => {
                let _ = writeln!(out, "║ {} - {}", track.artist, track.name);
            }
            None => {
                let _ = writeln!(out, "║ (nothing playing)");
            }
        }
        let state = if session.is_playing() { "playing" } else { "paused" };
        let _ = write!(out, "║ {:>9.1}s {:<8}", session.position_ms(now) / 1000.0, state);
        match session.timeline() {
            Some(info) => {
                let _ = writeln!(out, " tempo {:>5.1} | energy {:.2}", info.tempo, info.energy);
            }
            None => {
                let _ = writeln!(out, " no timeline");
            }
        }

        let _ = writeln!(out, "║");
        for (label, value) in [
            ("Energy", params.energy),
            ("Bass", params.bass),
            ("Mid", params.mid),
            ("High", params.high),
        ] {
            let _ = writeln!(out, "║   {:<7}{:>6.3} ■{:<20}", label, value, Self::bar(value));
        }
        let _ = writeln!(out, "║   {:<7}{:>6.1}°", "Hue", params.hue);

        let _ = writeln!(out, "║");
        let _ = writeln!(out, "║ Recent cues ({} beats):", self.beats_seen);
        for line in &self.recent {
            let _ = writeln!(out, "║   {}", line);
        }
        let _ = writeln!(out, "╚═══════════════════════════════════════════════════╝");
        out
    }
}

impl CueListener for TerminalOverlay {
    fn on_beat(&mut self, confidence: f32) {
        self.beats_seen += 1;
        self.remember(format!("beat     {:.2}", confidence));
    }

    fn on_segment(&mut self, segment: &SegmentMapping) {
        let pitch = segment.dominant_pitch.map_or("-", |index| PITCH_NAMES[index]);
        self.remember(format!("segment  {:<2} {:>6.1} dB", pitch, segment.loudness_db));
    }

    fn on_section(&mut self, section: &SectionMood) {
        let key = section.key.map_or("?", |key| PITCH_NAMES[key as usize % PITCH_NAMES.len()]);
        self.remember(format!("section  {} {:?} @ {:.0} bpm", key, section.mode, section.tempo));
    }
}

impl RenderConsumer for TerminalOverlay {
    fn render(&mut self, params: &ReactiveParameters, session: &VisualizerSession, now: Instant) {
        if self.every == 0 {
            return;
        }
        self.frame_count = self.frame_count.wrapping_add(1);
        if self.frame_count % self.every != 0 {
            return;
        }

        // Clear screen and home the cursor
        print!("\x1B[2J\x1B[1;1H");
        print!("{}", self.format_frame(params, session, now));
    }
}
