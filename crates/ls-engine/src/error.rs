//! Engine error types.

use alloc::string::String;
use thiserror::Error;

/// Why a note could not be handed to the mixer.
///
/// All variants mean "note dropped": callers must not retry, since a
/// retry loop has no place next to a realtime audio path.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// Every voice slot is in use
    #[error("voice pool exhausted")]
    PoolExhausted,

    /// The sample has no frames or no sample rate, or the pitch ratio
    /// is not positive
    #[error("sample has no playable audio data")]
    InvalidSample,

    /// The instrument has no sample mapped to this pitch
    #[error("no sample mapped to pitch {0}")]
    UnmappedPitch(u8),

    /// The command queue to the audio thread is full
    #[error("mixer command queue full")]
    QueueFull,

    /// The audio device is gone
    #[error("audio output unavailable")]
    Unavailable,
}

/// Errors from populating the sample cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The loader could not produce the sample
    #[error("failed to load sample '{id}': {reason}")]
    Load { id: String, reason: String },

    /// The sample decoded to zero frames
    #[error("sample '{id}' is empty")]
    Empty { id: String },

    /// The sample declares a rate of 0 Hz
    #[error("sample '{id}' has no sample rate")]
    NoSampleRate { id: String },
}
