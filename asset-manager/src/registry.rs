use std::sync::Arc;

use tracing::{debug, warn};

use crate::sfx_loader::{decode_sound, SoundCache, SoundLoader, DEFAULT_FILTER_QUALITY};
use crate::util::{AssetError, DEFAULT_ENGINE_SR, MAX_QPATH};

/// Index of a sound in a [`SoundRegistry`]. Stable for the registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundId(pub usize);

#[derive(Debug)]
struct SoundAsset {
    name: String,
    cache: Option<Arc<SoundCache>>,
}

/// Fixed-capacity, name-deduplicated sound table with lazy decoding.
pub struct SoundRegistry {
    assets: Vec<SoundAsset>,
    capacity: usize,
    loader: Box<dyn SoundLoader>,
    target_rate: u32,
    filter_quality: u8,
}

impl SoundRegistry {
    pub fn new(loader: Box<dyn SoundLoader>, capacity: usize) -> Self {
        Self {
            assets: Vec::new(),
            capacity,
            loader,
            target_rate: DEFAULT_ENGINE_SR,
            filter_quality: DEFAULT_FILTER_QUALITY,
        }
    }

    /// Rate every sound is converted to on load. Drops caches decoded at another rate.
    pub fn set_target_rate(&mut self, rate: u32) {
        if rate != self.target_rate {
            self.target_rate = rate;
            self.flush();
        }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn set_filter_quality(&mut self, quality: u8) {
        self.filter_quality = quality;
    }

    /// Look a name up, inserting an unloaded entry when it is new.
    pub fn find_or_insert(&mut self, name: &str) -> Result<SoundId, AssetError> {
        if name.len() >= MAX_QPATH {
            return Err(AssetError::NameTooLong(name.to_string()));
        }
        if let Some(id) = self.find(name) {
            return Ok(id);
        }
        if self.assets.len() >= self.capacity {
            return Err(AssetError::ResourceLimit(format!(
                "sound table full ({} entries) loading {}",
                self.capacity, name
            )));
        }
        self.assets.push(SoundAsset { name: name.to_string(), cache: None });
        Ok(SoundId(self.assets.len() - 1))
    }

    pub fn find(&self, name: &str) -> Option<SoundId> {
        self.assets.iter().position(|a| a.name == name).map(SoundId)
    }

    pub fn name(&self, id: SoundId) -> Option<&str> {
        self.assets.get(id.0).map(|a| a.name.as_str())
    }

    /// Decoded data for `id`, loading it on first use.
    pub fn load(&mut self, id: SoundId) -> Result<Arc<SoundCache>, AssetError> {
        let target_rate = self.target_rate;
        let quality = self.filter_quality;
        let asset = self
            .assets
            .get_mut(id.0)
            .ok_or_else(|| AssetError::NotFound(format!("sound id {}", id.0)))?;
        if let Some(cache) = &asset.cache {
            return Ok(Arc::clone(cache));
        }

        let bytes = self.loader.load_bytes(&asset.name).map_err(|e| {
            warn!("couldn't load {}: {}", asset.name, e);
            e
        })?;
        let cache = Arc::new(decode_sound(&bytes, target_rate, quality).map_err(|e| {
            warn!("couldn't decode {}: {}", asset.name, e);
            e
        })?);
        debug!(name = %asset.name, frames = cache.length, "sound loaded");
        asset.cache = Some(Arc::clone(&cache));
        Ok(cache)
    }

    /// Decoded data if already resident. Never touches the loader.
    pub fn cached(&self, id: SoundId) -> Option<Arc<SoundCache>> {
        self.assets.get(id.0).and_then(|a| a.cache.clone())
    }

    pub fn is_cached(&self, id: SoundId) -> bool {
        self.assets.get(id.0).is_some_and(|a| a.cache.is_some())
    }

    /// Drop every decoded cache; names and ids stay valid.
    pub fn flush(&mut self) {
        for asset in &mut self.assets {
            asset.cache = None;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SoundId, &str, Option<&Arc<SoundCache>>)> {
        self.assets
            .iter()
            .enumerate()
            .map(|(i, a)| (SoundId(i), a.name.as_str(), a.cache.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfx::{write_sfx_bytes, SampleFormat};
    use crate::sfx_loader::MemoryLoader;

    fn registry_with(names: &[&str], capacity: usize) -> SoundRegistry {
        let mut loader = MemoryLoader::new();
        for n in names {
            loader.insert(*n, write_sfx_bytes(&[0.0; 64], 44100, 1, SampleFormat::S16, None));
        }
        SoundRegistry::new(Box::new(loader), capacity)
    }

    #[test]
    fn names_are_deduplicated() {
        let mut reg = registry_with(&["a.sfx"], 4);
        let a = reg.find_or_insert("a.sfx").unwrap();
        let b = reg.find_or_insert("a.sfx").unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn full_table_is_reported() {
        let mut reg = registry_with(&[], 1);
        reg.find_or_insert("one.sfx").unwrap();
        assert!(matches!(reg.find_or_insert("two.sfx"), Err(AssetError::ResourceLimit(_))));
        // existing names still resolve
        assert!(reg.find_or_insert("one.sfx").is_ok());
    }

    #[test]
    fn long_names_rejected() {
        let mut reg = registry_with(&[], 4);
        let name = "x".repeat(MAX_QPATH);
        assert!(matches!(reg.find_or_insert(&name), Err(AssetError::NameTooLong(_))));
    }

    #[test]
    fn load_is_lazy_and_cached() {
        let mut reg = registry_with(&["hit.sfx"], 4);
        let id = reg.find_or_insert("hit.sfx").unwrap();
        assert!(!reg.is_cached(id));
        let first = reg.load(id).unwrap();
        assert!(reg.is_cached(id));
        let second = reg.load(id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn missing_file_fails_load_but_keeps_entry() {
        let mut reg = registry_with(&[], 4);
        let id = reg.find_or_insert("ghost.sfx").unwrap();
        assert!(reg.load(id).is_err());
        assert_eq!(reg.name(id), Some("ghost.sfx"));
        assert!(reg.cached(id).is_none());
    }

    #[test]
    fn changing_rate_flushes() {
        let mut reg = registry_with(&["hit.sfx"], 4);
        let id = reg.find_or_insert("hit.sfx").unwrap();
        reg.load(id).unwrap();
        reg.set_target_rate(22050);
        assert!(!reg.is_cached(id));
        assert_eq!(reg.load(id).unwrap().sample_rate, 22050);
    }
}
