use super::cues::{CueEvent, CueKind, CueTimeline};
use log::{debug, info, warn};
use std::collections::VecDeque;

/// An event that has just ended is still delivered if it ended within this
/// many seconds of the current position.
pub const TRAILING_GRACE_SECONDS: f64 = 0.1;

/// Offset added to the position by `current_segment` / `current_section`.
pub const CURRENT_CUE_OFFSET_SECONDS: f64 = 0.1;

// Absorbs ms -> s conversion error so inclusive boundaries stay inclusive
// (1600 ms - 0.1 s must still reach an event that ends at 1.5 s).
const TIME_EPSILON: f64 = 1e-9;

/// A cue delivered by `CueDispatcher::update`, with its index in its sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredCue {
    pub kind: CueKind,
    pub index: usize,
    pub event: CueEvent,
}

#[derive(Debug, Default)]
struct CueTrack {
    events: Vec<CueEvent>,
    /// Index of the most recently fired event
    cursor: Option<usize>,
    /// Every index below this has either fired or closed its window without
    /// firing. Only valid while the position keeps moving forward.
    scan_floor: usize,
}

impl CueTrack {
    fn new(events: Vec<CueEvent>) -> Self {
        Self {
            events,
            cursor: None,
            scan_floor: 0,
        }
    }

    fn after_cursor(&self) -> usize {
        self.cursor.map_or(0, |cursor| cursor + 1)
    }

    /// Greatest index whose start lies strictly before `seconds`.
    fn last_starting_before(&self, seconds: f64) -> Option<usize> {
        self.events
            .partition_point(|event| event.start < seconds)
            .checked_sub(1)
    }

    fn scan(&mut self, kind: CueKind, position: f64, horizon: f64, fired: &mut Vec<FiredCue>) {
        let trailing = position - TRAILING_GRACE_SECONDS;
        let mut index = self.after_cursor().max(self.scan_floor);

        while let Some(event) = self.events.get(index) {
            if event.start > horizon + TIME_EPSILON {
                break;
            }
            if event.end() + TIME_EPSILON >= trailing {
                self.cursor = Some(index);
                fired.push(FiredCue {
                    kind,
                    index,
                    event: event.clone(),
                });
            }
            // A candidate whose window already closed leaves the cursor alone;
            // it can never fire again unless the position moves backwards.
            index += 1;
        }

        self.scan_floor = index;
    }
}

/// Fires beat, segment and section cues exactly once each as playback time
/// sweeps forward.
///
/// Fired cues are queued rather than pushed to callbacks; the owner drains
/// the queue once per frame with [`CueDispatcher::drain_fired`]. The queue is
/// bounded and drops its oldest entries when a consumer falls behind.
pub struct CueDispatcher {
    tracks: [CueTrack; 3],
    queue: VecDeque<FiredCue>,
    queue_capacity: usize,
    dropped: u64,
    last_position: Option<f64>,
    scratch: Vec<FiredCue>,
}

impl CueDispatcher {
    pub fn new(queue_capacity: usize) -> Self {
        let queue_capacity = queue_capacity.max(1);
        Self {
            tracks: Default::default(),
            queue: VecDeque::with_capacity(queue_capacity),
            queue_capacity,
            dropped: 0,
            last_position: None,
            scratch: Vec::new(),
        }
    }

    /// Replace all three sequences and reset every cursor.
    ///
    /// Anything still queued from the previous timeline is discarded so a cue
    /// from an old track is never delivered after the swap.
    pub fn load_timeline(&mut self, timeline: CueTimeline) {
        let [beats, segments, sections] = timeline.into_sequences();
        info!(
            "Loaded cue timeline: {} beats, {} segments, {} sections",
            beats.len(),
            segments.len(),
            sections.len()
        );
        self.tracks = [CueTrack::new(beats), CueTrack::new(segments), CueTrack::new(sections)];
        self.queue.clear();
        self.last_position = None;
    }

    /// Drop the timeline entirely; nothing fires until the next load.
    pub fn clear(&mut self) {
        if !self.is_empty() {
            debug!("Clearing cue timeline");
        }
        self.tracks = Default::default();
        self.queue.clear();
        self.last_position = None;
    }

    /// Advance to `position_ms`, queueing every cue that becomes due.
    ///
    /// Returns how many cues fired during this call.
    pub fn update(&mut self, position_ms: f64, lookahead_ms: f64) -> usize {
        let position = position_ms / 1000.0;
        let horizon = (position_ms + lookahead_ms) / 1000.0;

        if let Some(last) = self.last_position {
            if position < last {
                // Windows closed at the old position may be open again
                for track in &mut self.tracks {
                    track.scan_floor = 0;
                }
            }
        }
        self.last_position = Some(position);

        let mut fired = std::mem::take(&mut self.scratch);
        for kind in CueKind::ALL {
            self.tracks[kind.slot()].scan(kind, position, horizon, &mut fired);
        }

        let count = fired.len();
        for cue in fired.drain(..) {
            if self.queue.len() == self.queue_capacity {
                self.queue.pop_front();
                self.dropped += 1;
                if self.dropped == 1 || self.dropped % 100 == 0 {
                    warn!("Cue queue full; dropped {} cues so far", self.dropped);
                }
            }
            self.queue.push_back(cue);
        }
        self.scratch = fired;
        count
    }

    /// Reposition every cursor after a discontinuous jump in playback time.
    ///
    /// Each cursor lands on the last cue starting strictly before the new
    /// position, so cues behind it are not replayed and the next cue ahead is
    /// not missed. A position beyond the last cue pins the cursor there.
    pub fn seek(&mut self, position_ms: f64) {
        let position = position_ms / 1000.0;
        for track in &mut self.tracks {
            track.cursor = track.last_starting_before(position);
            track.scan_floor = 0;
        }
        self.last_position = None;
        debug!(
            "Seek to {:.0}ms: cursors beat={:?} segment={:?} section={:?}",
            position_ms,
            self.cursor(CueKind::Beat),
            self.cursor(CueKind::Segment),
            self.cursor(CueKind::Section)
        );
    }

    /// Segment in effect at `position_ms`, independent of the fire-once stream.
    pub fn current_segment(&self, position_ms: f64) -> Option<&CueEvent> {
        self.current(CueKind::Segment, position_ms).map(|(_, event)| event)
    }

    /// Section in effect at `position_ms`, independent of the fire-once stream.
    pub fn current_section(&self, position_ms: f64) -> Option<&CueEvent> {
        self.current(CueKind::Section, position_ms).map(|(_, event)| event)
    }

    pub fn current(&self, kind: CueKind, position_ms: f64) -> Option<(usize, &CueEvent)> {
        let track = &self.tracks[kind.slot()];
        let index = track.last_starting_before(position_ms / 1000.0 + CURRENT_CUE_OFFSET_SECONDS)?;
        Some((index, &track.events[index]))
    }

    pub fn drain_fired(&mut self) -> std::collections::vec_deque::Drain<'_, FiredCue> {
        self.queue.drain(..)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn cursor(&self, kind: CueKind) -> Option<usize> {
        self.tracks[kind.slot()].cursor
    }

    /// First index the next `update` will examine for `kind`.
    pub fn scan_start(&self, kind: CueKind) -> usize {
        let track = &self.tracks[kind.slot()];
        track.after_cursor().max(track.scan_floor)
    }

    pub fn events(&self, kind: CueKind) -> &[CueEvent] {
        &self.tracks[kind.slot()].events
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(|track| track.events.is_empty())
    }
}

impl Default for CueDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}
