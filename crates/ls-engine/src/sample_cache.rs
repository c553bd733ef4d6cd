//! Sample cache: decoded PCM shared by every voice that plays it.
//!
//! Populated from the control thread before playback. Entries are never
//! mutated or evicted, so the audio thread can read through the `Arc`s
//! handed to it without locking.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use ls_ir::Sample;
use slotmap::SlotMap;

use crate::error::CacheError;

slotmap::new_key_type! {
    /// Key for referencing samples in the cache.
    pub struct SampleKey;
}

/// Source of decoded samples, keyed by id (a file stem, an asset name).
pub trait SampleLoader {
    fn load(&self, id: &str) -> Result<Sample, CacheError>;
}

/// Cache occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub count: usize,
    pub total_bytes: usize,
}

/// Preload-everything sample store.
#[derive(Debug, Default)]
pub struct SampleCache {
    samples: SlotMap<SampleKey, Arc<Sample>>,
    ids: BTreeMap<String, SampleKey>,
    total_bytes: usize,
}

impl SampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `id` through `loader` unless it is already cached.
    pub fn preload(
        &mut self,
        id: &str,
        loader: &dyn SampleLoader,
    ) -> Result<SampleKey, CacheError> {
        if let Some(key) = self.ids.get(id) {
            return Ok(*key);
        }
        let sample = loader.load(id)?;
        self.insert(id, sample)
    }

    /// Store an already decoded sample under `id`. An existing entry wins:
    /// cached data is never replaced while voices may reference it.
    pub fn insert(&mut self, id: &str, sample: Sample) -> Result<SampleKey, CacheError> {
        if let Some(key) = self.ids.get(id) {
            return Ok(*key);
        }
        if sample.is_empty() {
            return Err(CacheError::Empty { id: id.to_string() });
        }
        if sample.sample_rate == 0 {
            return Err(CacheError::NoSampleRate { id: id.to_string() });
        }
        self.total_bytes += sample.size_bytes();
        log::debug!(
            "sample cache: '{}' ({} frames, {} Hz, {} ch)",
            id,
            sample.len(),
            sample.sample_rate,
            sample.data.num_channels()
        );
        let key = self.samples.insert(Arc::new(sample));
        self.ids.insert(id.to_string(), key);
        Ok(key)
    }

    /// Shared handle to the cached data; never copies PCM.
    pub fn get(&self, id: &str) -> Option<Arc<Sample>> {
        self.ids.get(id).and_then(|key| self.samples.get(*key)).cloned()
    }

    /// Shared handle by key.
    pub fn get_by_key(&self, key: SampleKey) -> Option<Arc<Sample>> {
        self.samples.get(key).cloned()
    }

    /// Key for a cached id.
    pub fn key(&self, id: &str) -> Option<SampleKey> {
        self.ids.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// Cached ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.keys().map(String::as_str)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            count: self.samples.len(),
            total_bytes: self.total_bytes,
        }
    }
}
