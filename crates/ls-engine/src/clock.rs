//! Audio clock: the single time base for all scheduling math.
//!
//! The control thread reads the clock once per tick and threads that
//! value through every beat computation of the tick, so two queries in
//! the same tick always agree.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// A monotonic audio-clock time source.
pub trait AudioClock: Send {
    /// Current audio-clock time in seconds. Never decreases.
    fn now(&self) -> f64;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Frames per audio callback buffer (0 before the first callback).
    fn buffer_size_frames(&self) -> u32;

    /// False while the audio device is gone; callers must degrade to a
    /// no-op state instead of scheduling against a frozen clock.
    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct ClockShared {
    frames: AtomicU64,
    buffer_frames: AtomicU32,
    available: AtomicBool,
    sample_rate: u32,
}

/// Audio clock derived from the number of frames the mixer has rendered.
///
/// Cloning shares the underlying counter; the mixer's renderer is the
/// only writer.
#[derive(Clone, Debug)]
pub struct FrameClock {
    shared: Arc<ClockShared>,
}

impl FrameClock {
    /// Create a clock at frame 0.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            shared: Arc::new(ClockShared {
                frames: AtomicU64::new(0),
                buffer_frames: AtomicU32::new(0),
                available: AtomicBool::new(true),
                sample_rate: sample_rate.max(1),
            }),
        }
    }

    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    /// Mark the device as lost or recovered.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::Release);
    }

    /// Absolute output frame for an audio-clock time, rounded to nearest.
    pub fn frame_for_time(&self, seconds: f64) -> u64 {
        frame_for_time(seconds, self.shared.sample_rate)
    }

    /// Audio-clock time of an absolute output frame.
    pub fn time_for_frame(&self, frame: u64) -> f64 {
        frame as f64 / self.shared.sample_rate as f64
    }

    /// Advance after a buffer of `frames` was rendered.
    pub(crate) fn advance(&self, frames: u32) {
        self.shared.buffer_frames.store(frames, Ordering::Relaxed);
        self.shared.frames.fetch_add(frames as u64, Ordering::AcqRel);
    }
}

impl AudioClock for FrameClock {
    fn now(&self) -> f64 {
        self.time_for_frame(self.frames())
    }

    fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    fn buffer_size_frames(&self) -> u32 {
        self.shared.buffer_frames.load(Ordering::Relaxed)
    }

    fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::Acquire)
    }
}

/// Convert seconds to an absolute frame index (negative times map to 0).
pub fn frame_for_time(seconds: f64, sample_rate: u32) -> u64 {
    if seconds <= 0.0 {
        return 0;
    }
    libm::round(seconds * sample_rate as f64) as u64
}

/// Externally driven clock for tests and tools.
#[derive(Clone, Debug)]
pub struct ManualClock {
    seconds: Arc<AtomicU64>,
    available: Arc<AtomicBool>,
    sample_rate: u32,
    buffer_frames: u32,
}

impl ManualClock {
    /// Create a clock at time zero.
    pub fn new(sample_rate: u32, buffer_frames: u32) -> Self {
        Self {
            seconds: Arc::new(AtomicU64::new(0f64.to_bits())),
            available: Arc::new(AtomicBool::new(true)),
            sample_rate,
            buffer_frames,
        }
    }

    /// Jump to an absolute time. Earlier times are ignored so the clock
    /// stays monotonic.
    pub fn set(&self, seconds: f64) {
        if seconds >= self.now() {
            self.seconds.store(seconds.to_bits(), Ordering::Release);
        }
    }

    /// Move forward by `dt` seconds.
    pub fn advance(&self, dt: f64) {
        self.set(self.now() + dt.max(0.0));
    }

    /// Mark the clock as unavailable (device lost).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds.load(Ordering::Acquire))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn buffer_size_frames(&self) -> u32 {
        self.buffer_frames
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }
}
