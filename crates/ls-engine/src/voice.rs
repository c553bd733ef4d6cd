//! Voice: one sounding (or about-to-sound) sample instance.

use alloc::sync::Arc;
use ls_ir::Sample;

/// Who scheduled a voice, carried for introspection and debugging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VoiceTag {
    /// Track or instrument id
    pub source: u32,
    /// Pitch that produced the voice
    pub pitch: u8,
}

impl VoiceTag {
    pub const fn new(source: u32, pitch: u8) -> Self {
        Self { source, pitch }
    }
}

/// Opaque reference to an allocated voice.
///
/// Handles are safely stale: once the voice finishes, the slot's
/// generation moves on and every operation on the old handle is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    slot: u16,
    generation: u32,
}

impl VoiceHandle {
    /// Build a handle from its parts. Only meaningful for the mixer that
    /// issued it; test doubles use this to mint their own.
    pub const fn new(slot: u16, generation: u32) -> Self {
        Self { slot, generation }
    }

    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// A single voice producing audio from a cached sample.
#[derive(Clone, Debug)]
pub struct Voice {
    /// Shared sample data (owned by the cache, referenced here)
    pub sample: Arc<Sample>,
    pub handle: VoiceHandle,
    pub tag: VoiceTag,
    /// Read position in sample frames
    pub cursor: f64,
    /// Cursor advance per output frame (pitch ratio × rate conversion)
    pub step: f64,
    /// First output frame; `None` = start at the next buffer boundary
    pub start_frame: Option<u64>,
    /// Output frame where the fade-out begins
    pub stop_frame: Option<u64>,
    /// Fade-out length in output frames
    pub fade_frames: u32,
    /// Envelope level the fade-out starts from
    pub fade_from: f32,
    /// Linear gain
    pub gain: f32,
}

impl Voice {
    /// Create a voice for `sample` at an output rate of `output_rate`.
    pub fn new(
        sample: Arc<Sample>,
        handle: VoiceHandle,
        tag: VoiceTag,
        gain: f32,
        pitch_ratio: f32,
        output_rate: u32,
    ) -> Self {
        let rate_ratio = sample.sample_rate as f64 / output_rate.max(1) as f64;
        Self {
            sample,
            handle,
            tag,
            cursor: 0.0,
            step: pitch_ratio as f64 * rate_ratio,
            start_frame: None,
            stop_frame: None,
            fade_frames: 0,
            fade_from: 1.0,
            gain,
        }
    }

    /// Request a fade-out starting at `frame`.
    ///
    /// A request that starts earlier, or that would reach silence sooner
    /// than the pending fade, takes over from the envelope level at `frame`.
    pub fn stop_at(&mut self, frame: u64, fade_frames: u32) {
        if let Some(existing) = self.stop_frame {
            let current_end = existing + self.fade_frames as u64;
            let new_end = frame + fade_frames as u64;
            if frame >= existing && new_end >= current_end {
                return;
            }
        }
        self.fade_from = self.envelope_at(frame);
        self.stop_frame = Some(frame);
        self.fade_frames = fade_frames;
    }

    /// Fade envelope at the absolute output frame `frame`.
    pub fn envelope_at(&self, frame: u64) -> f32 {
        match self.stop_frame {
            Some(stop) if frame >= stop => {
                let t = frame - stop;
                if t >= self.fade_frames as u64 {
                    0.0
                } else {
                    self.fade_from * (1.0 - t as f32 / self.fade_frames as f32)
                }
            }
            _ => 1.0,
        }
    }

    /// True once the voice has begun (or is due to begin) by `frame`.
    pub fn has_started(&self, frame: u64) -> bool {
        self.start_frame.map_or(true, |start| start <= frame)
    }

    /// Mix this voice into an interleaved buffer whose first frame is the
    /// absolute output frame `buffer_start`. Sums into `out`.
    ///
    /// Returns false once the voice is finished and its slot can be freed.
    pub fn render(&mut self, out: &mut [f32], channels: usize, buffer_start: u64) -> bool {
        let start = *self.start_frame.get_or_insert(buffer_start);
        if let Some(stop) = self.stop_frame {
            if stop <= start {
                return false;
            }
        }

        let frames = out.len() / channels.max(1);
        let len = self.sample.len() as f64;
        let first = start.saturating_sub(buffer_start).min(frames as u64) as usize;

        for i in first..frames {
            if self.cursor >= len {
                return false;
            }
            let frame = buffer_start + i as u64;
            if let Some(stop) = self.stop_frame {
                if frame >= stop && frame - stop >= self.fade_frames as u64 {
                    return false;
                }
            }
            let envelope = self.envelope_at(frame);

            let (left, right) = self.sample.data.frame_interpolated(self.cursor);
            let g = self.gain * envelope;
            match channels {
                0 => {}
                1 => out[i] += (left + right) * 0.5 * g,
                _ => {
                    out[i * channels] += left * g;
                    out[i * channels + 1] += right * g;
                }
            }
            self.cursor += self.step;
        }

        self.cursor < len
    }
}
