//! Filesystem sample loading for the sample cache.

use std::fs;
use std::path::{Path, PathBuf};

use ls_engine::{CacheError, SampleLoader};
use ls_ir::Sample;

use crate::{load_wav, FormatError};

/// Read and decode a WAV file, naming the sample after the file stem.
pub fn load_wav_file(path: &Path) -> Result<Sample, FormatError> {
    let data = fs::read(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("sample");
    load_wav(&data, name)
}

/// Resolves sample ids to WAV files under a root directory.
///
/// An id without an extension gets `.wav` appended, so `"kick"` loads
/// `<root>/kick.wav` and `"keys/c4"` loads `<root>/keys/c4.wav`.
#[derive(Clone, Debug)]
pub struct WavSampleLoader {
    root: PathBuf,
}

impl WavSampleLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path an id resolves to.
    pub fn path_for(&self, id: &str) -> PathBuf {
        let path = self.root.join(id);
        if path.extension().is_some() {
            path
        } else {
            path.with_extension("wav")
        }
    }
}

impl SampleLoader for WavSampleLoader {
    fn load(&self, id: &str) -> Result<Sample, CacheError> {
        let path = self.path_for(id);
        load_wav_file(&path).map_err(|e| CacheError::Load {
            id: id.to_string(),
            reason: format!("{}: {e}", path.display()),
        })
    }
}
