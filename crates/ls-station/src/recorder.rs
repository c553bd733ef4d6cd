//! Live input bookkeeping.
//!
//! Tracks which keys are down, the voice each one started and, while the
//! transport plays, the held event each press inserted into the armed
//! track. The station drives the instruments; the recorder only decides
//! where notes land and how long they become.

use std::collections::BTreeMap;

use ls_engine::VoiceHandle;
use ls_ir::{normalize_beat, quantize_beat, EventId, InstrumentKind, TrackId};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecorderConfig {
    /// Snap recorded starts to this grid, in beats
    pub quantize_beats: Option<f64>,
    /// Shortest duration a release can produce, in beats
    pub min_note_beats: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            quantize_beats: None,
            min_note_beats: 0.0625,
        }
    }
}

/// A held event written into a track by a key press.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Take {
    pub track: TrackId,
    pub event: EventId,
    /// Audio-clock time of the press
    pub pressed_at: f64,
}

/// A key currently down.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LiveNote {
    pub instrument: InstrumentKind,
    /// `None` when the mixer refused the voice
    pub handle: Option<VoiceHandle>,
    pub take: Option<Take>,
}

/// Where a recorded note lands in the loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Beat inside the loop, in `[0, total_beats)`
    pub beat: f64,
    /// Loop iteration the beat belongs to
    pub loop_index: i64,
}

#[derive(Debug, Default)]
pub struct Recorder {
    config: RecorderConfig,
    armed: Option<TrackId>,
    live: BTreeMap<u8, LiveNote>,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            armed: None,
            live: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: RecorderConfig) {
        self.config = config;
    }

    pub fn armed(&self) -> Option<TrackId> {
        self.armed
    }

    /// Arm `track`. Returns true if the armed track changed.
    pub fn arm(&mut self, track: TrackId) -> bool {
        self.armed.replace(track) != Some(track)
    }

    /// Returns the previously armed track.
    pub fn disarm(&mut self) -> Option<TrackId> {
        self.armed.take()
    }

    /// Placement of a press at `(loop_index, beat)`, after quantizing.
    ///
    /// A start quantized up to the loop end becomes beat 0 of the next loop.
    pub fn place(&self, loop_index: i64, beat: f64, total_beats: f64) -> Placement {
        let snapped = match self.config.quantize_beats {
            Some(grid) => quantize_beat(beat, grid),
            None => beat,
        };
        let loop_index = if snapped >= total_beats { loop_index + 1 } else { loop_index };
        Placement {
            beat: normalize_beat(snapped, total_beats),
            loop_index,
        }
    }

    /// Duration in beats of a note held for `held_beats`.
    ///
    /// Never shorter than `min_note_beats` nor longer than one loop.
    pub fn note_duration(&self, held_beats: f64, total_beats: f64) -> f64 {
        let min = self.config.min_note_beats.min(total_beats);
        held_beats.max(min).min(total_beats)
    }

    /// Register a key press. Returns the note it replaces if the key was
    /// already down (a retrigger).
    pub fn press(&mut self, pitch: u8, note: LiveNote) -> Option<LiveNote> {
        self.live.insert(pitch, note)
    }

    /// Release a key. `None` if the key was not down.
    pub fn release(&mut self, pitch: u8) -> Option<LiveNote> {
        self.live.remove(&pitch)
    }

    pub fn is_down(&self, pitch: u8) -> bool {
        self.live.contains_key(&pitch)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Forget held takes on `track` so a later release doesn't patch a
    /// track that is gone.
    pub fn forget_track(&mut self, track: TrackId) {
        for note in self.live.values_mut() {
            if note.take.is_some_and(|t| t.track == track) {
                note.take = None;
            }
        }
        if self.armed == Some(track) {
            self.armed = None;
        }
    }

    /// Drop every live note, returning them so their voices can be stopped.
    pub fn release_all(&mut self) -> Vec<(u8, LiveNote)> {
        std::mem::take(&mut self.live).into_iter().collect()
    }
}
