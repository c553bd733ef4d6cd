//! Audio output trait and error types.

use thiserror::Error;

/// Error type for audio operations.
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio device available
    #[error("no audio output device available")]
    NoDevice,
    /// Failed to initialize audio device
    #[error("device init error: {0}")]
    DeviceInit(String),
    /// Failed to create audio stream
    #[error("stream create error: {0}")]
    StreamCreate(String),
    /// Playback error
    #[error("playback error: {0}")]
    Playback(String),
    /// The device can't take f32 samples
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// Trait for audio output backends.
///
/// A backend pulls audio by calling the mixer's renderer from its own
/// realtime callback; the control thread only starts and stops it.
pub trait AudioOutput {
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Interleaved channel count.
    fn channels(&self) -> u16;

    /// Start (or resume) playback.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Pause playback; the callback outputs silence.
    fn stop(&mut self) -> Result<(), AudioError>;

    fn is_running(&self) -> bool;
}
