//! Note events recorded or imported into tracks.

/// A single note inside a track.
///
/// Positions and durations are in beats relative to the loop start.
/// A zero duration marks a note that is still held: the recorder patches
/// the duration exactly once when the matching note-off arrives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    /// Beat position inside the loop
    pub beat_time: f64,
    /// Instrument-defined pitch (MIDI note number for pitched instruments)
    pub pitch: u8,
    /// Velocity 0.0-1.0
    pub velocity: f32,
    /// Length in beats (0 = held, not yet terminated)
    pub duration: f64,
}

impl NoteEvent {
    /// Create a finished note. Velocity is clamped to `[0, 1]` and
    /// negative durations are treated as held.
    pub fn new(beat_time: f64, pitch: u8, velocity: f32, duration: f64) -> Self {
        Self {
            beat_time,
            pitch,
            velocity: velocity.clamp(0.0, 1.0),
            duration: duration.max(0.0),
        }
    }

    /// Create a held note whose duration is not yet known.
    pub fn held(beat_time: f64, pitch: u8, velocity: f32) -> Self {
        Self::new(beat_time, pitch, velocity, 0.0)
    }

    /// Returns true while the note has no note-off yet.
    pub fn is_held(&self) -> bool {
        self.duration <= 0.0
    }

    /// Beat at which the note ends (unwrapped: may exceed the loop length).
    pub fn end_beat(&self) -> f64 {
        self.beat_time + self.duration
    }
}
