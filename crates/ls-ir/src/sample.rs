//! Decoded sample data.

use alloc::vec::Vec;
use arrayvec::ArrayString;

/// A decoded, immutable PCM sample.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Sample name (usually the cache id)
    pub name: ArrayString<32>,
    /// Audio data, normalized to [-1, 1]
    pub data: SampleData,
    /// Native sample rate in Hz
    pub sample_rate: u32,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            data: SampleData::Mono(Vec::new()),
            sample_rate: 48_000,
        }
    }
}

impl Sample {
    /// Create a new empty sample.
    pub fn new(name: &str, sample_rate: u32) -> Self {
        let mut sample = Self { sample_rate, ..Self::default() };
        let _ = sample.name.try_push_str(name);
        sample
    }

    /// Create a mono sample from normalized frames.
    pub fn mono(name: &str, sample_rate: u32, frames: Vec<f32>) -> Self {
        let mut sample = Self::new(name, sample_rate);
        sample.data = SampleData::Mono(frames);
        sample
    }

    /// Get the length of the sample in frames.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the sample has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Memory held by the PCM data.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * self.data.num_channels() as usize * core::mem::size_of::<f32>()
    }

    /// Duration in seconds at the native rate.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }
}

/// Sample audio data.
#[derive(Clone, Debug)]
pub enum SampleData {
    /// Mono frames
    Mono(Vec<f32>),
    /// Stereo frames (left, right)
    Stereo(Vec<f32>, Vec<f32>),
}

impl SampleData {
    /// Get the number of sample frames.
    pub fn len(&self) -> usize {
        match self {
            SampleData::Mono(v) => v.len(),
            SampleData::Stereo(l, r) => l.len().min(r.len()),
        }
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of channels in the sample data.
    pub fn num_channels(&self) -> u16 {
        match self {
            SampleData::Mono(_) => 1,
            SampleData::Stereo(_, _) => 2,
        }
    }

    /// Stereo frame at an integer position; silence past the end.
    /// Mono data is duplicated to both sides.
    pub fn frame(&self, pos: usize) -> (f32, f32) {
        match self {
            SampleData::Mono(v) => {
                let s = v.get(pos).copied().unwrap_or(0.0);
                (s, s)
            }
            SampleData::Stereo(l, r) => (
                l.get(pos).copied().unwrap_or(0.0),
                r.get(pos).copied().unwrap_or(0.0),
            ),
        }
    }

    /// Linearly interpolated stereo frame at a fractional position.
    ///
    /// Blends between the two nearest frames; the frame past the end reads
    /// as silence so the tail fades to zero.
    pub fn frame_interpolated(&self, pos: f64) -> (f32, f32) {
        if pos < 0.0 {
            return (0.0, 0.0);
        }
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let (al, ar) = self.frame(idx);
        if frac == 0.0 {
            return (al, ar);
        }
        let (bl, br) = self.frame(idx + 1);
        (al + (bl - al) * frac, ar + (br - ar) * frac)
    }
}
