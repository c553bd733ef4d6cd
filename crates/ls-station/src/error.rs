use thiserror::Error;

use ls_audio::AudioError;
use ls_engine::CacheError;
use ls_formats::FormatError;

use crate::config::ConfigError;

/// Errors surfaced by the station outside the realtime path.
#[derive(Error, Debug)]
pub enum StationError {
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("no track with id {0}")]
    UnknownTrack(u32),
}
