//! Sample file formats for loopstation.
//!
//! Decodes WAV files into [`ls_ir::Sample`]s for the sample cache and
//! encodes rendered output for offline bounces.

mod loader;
mod wav_format;

pub use loader::{load_wav_file, WavSampleLoader};
pub use wav_format::{frames_to_wav, load_wav, write_wav};

use thiserror::Error;

/// Error type for format parsing.
#[derive(Error, Debug)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    #[error("invalid WAV header")]
    InvalidHeader,
    /// Unexpected end of file
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Encoding, bit depth or channel layout we can't decode
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),
    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
