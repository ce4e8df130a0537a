//! Per-variable handle owning a lazily created chunk cache
//!
//! The cache is created on first use with the variable's current settings
//! and lives behind a mutex, so a handle can be shared between threads.
//! Settings changes made after creation are applied to the live cache.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use zcache_core::{
    normalize_var_key, CacheError, CacheSettings, ChunkCoords, ChunkStore, Config,
    DimensionSeparator,
};

use crate::cache::{CacheOptions, CacheStats, ChunkCache};

struct VariableState {
    settings: CacheSettings,
    fill_value: Option<Vec<u8>>,
    cache: Option<ChunkCache>,
}

/// One chunked array variable and its chunk cache
pub struct ArrayVariable {
    var_key: String,
    rank: usize,
    chunk_byte_size: usize,
    separator: DimensionSeparator,
    writable: bool,
    store: Arc<dyn ChunkStore>,
    state: Mutex<VariableState>,
}

impl ArrayVariable {
    pub fn new(
        var_key: &str,
        rank: usize,
        chunk_byte_size: usize,
        separator: DimensionSeparator,
        store: Arc<dyn ChunkStore>,
    ) -> Result<Self, CacheError> {
        if chunk_byte_size == 0 {
            return Err(CacheError::invalid("chunk byte size must be non-zero"));
        }
        let var_key = normalize_var_key(var_key)?;
        Ok(Self {
            var_key,
            rank,
            chunk_byte_size,
            separator,
            writable: true,
            store,
            state: Mutex::new(VariableState {
                settings: CacheSettings::default(),
                fill_value: None,
                cache: None,
            }),
        })
    }

    /// Build a variable using the cache section of a loaded configuration
    pub fn from_config(
        var_key: &str,
        rank: usize,
        chunk_byte_size: usize,
        config: &Config,
        store: Arc<dyn ChunkStore>,
    ) -> Result<Self, CacheError> {
        let settings = config
            .cache
            .settings()
            .map_err(|e| CacheError::invalid(e.to_string()))?;

        let mut variable = Self::new(
            var_key,
            rank,
            chunk_byte_size,
            config.cache.dimension_separator,
            store,
        )?;
        variable.writable = config.store.writable;
        variable.set_chunk_cache(settings)?;
        if let Some(pattern) = &config.cache.fill_value {
            variable.set_fill_value(Some(pattern.clone()))?;
        }
        Ok(variable)
    }

    pub fn var_key(&self) -> &str {
        &self.var_key
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn chunk_byte_size(&self) -> usize {
        self.chunk_byte_size
    }

    /// Apply new cache settings.
    ///
    /// The settings are validated first. If the cache already exists it is
    /// resized, which flushes and drops every resident chunk.
    pub fn set_chunk_cache(&self, settings: CacheSettings) -> Result<(), CacheError> {
        settings.validate()?;

        let mut state = self.state.lock();
        state.settings = settings;
        if let Some(cache) = state.cache.as_mut() {
            debug!("variable[{}]: resizing live cache to {} bytes", self.var_key, settings.size_bytes);
            cache.resize(settings.size_bytes)?;
        }
        Ok(())
    }

    pub fn chunk_cache_settings(&self) -> CacheSettings {
        self.state.lock().settings
    }

    /// Set the fill value pattern; its length must divide the chunk size
    pub fn set_fill_value(&self, pattern: Option<Vec<u8>>) -> Result<(), CacheError> {
        if let Some(pattern) = &pattern {
            if pattern.is_empty() || self.chunk_byte_size % pattern.len() != 0 {
                return Err(CacheError::invalid(format!(
                    "fill value of {} bytes does not tile a {} byte chunk",
                    pattern.len(),
                    self.chunk_byte_size
                )));
            }
        }

        let mut state = self.state.lock();
        if let Some(cache) = state.cache.as_mut() {
            cache.set_fill_value(pattern.clone())?;
        }
        state.fill_value = pattern;
        Ok(())
    }

    /// Run `f` against the cache, creating the cache on first use
    pub fn with_cache<R>(
        &self,
        f: impl FnOnce(&mut ChunkCache) -> Result<R, CacheError>,
    ) -> Result<R, CacheError> {
        let mut state = self.state.lock();
        let state = &mut *state;

        let cache = match state.cache.take() {
            Some(cache) => cache,
            None => {
                let mut options =
                    CacheOptions::new(self.chunk_byte_size, self.separator, state.settings.size_bytes)
                        .rank(self.rank)
                        .var_key(self.var_key.as_str())
                        .writable(self.writable);
                options.fill_value = state.fill_value.clone();

                let cache = ChunkCache::new(options, Arc::clone(&self.store))?;
                debug!(
                    "variable[{}]: chunk cache created with {} slots",
                    self.var_key,
                    cache.capacity()
                );
                cache
            }
        };
        f(state.cache.insert(cache))
    }

    /// Copy of a chunk's bytes and whether it was synthesized by this read
    pub fn read_chunk(&self, coords: impl Into<ChunkCoords>) -> Result<(Vec<u8>, bool), CacheError> {
        let coords = coords.into();
        self.with_cache(|cache| {
            let read = cache.read(coords)?;
            Ok((read.data.to_vec(), read.synthesized))
        })
    }

    /// Replace a whole chunk; `data` must be exactly one chunk long
    pub fn write_chunk(&self, coords: impl Into<ChunkCoords>, data: &[u8]) -> Result<(), CacheError> {
        if data.len() != self.chunk_byte_size {
            return Err(CacheError::invalid(format!(
                "chunk data is {} bytes, expected {}",
                data.len(),
                self.chunk_byte_size
            )));
        }
        let coords = coords.into();
        self.with_cache(|cache| {
            cache.write(coords)?.copy_from_slice(data);
            Ok(())
        })
    }

    /// Flush dirty chunks; a no-op when no cache has been created
    pub fn flush(&self) -> Result<(), CacheError> {
        match self.state.lock().cache.as_mut() {
            Some(cache) => cache.flush_all(),
            None => Ok(()),
        }
    }

    /// Flush and drop the cache.
    ///
    /// If the flush fails the cache is kept so the close can be retried.
    pub fn close(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock();
        if let Some(cache) = state.cache.as_mut() {
            cache.flush_all()?;
            let stats = cache.stats();
            info!(
                "variable[{}]: closed cache ({} hits, {} misses, {} flushes)",
                self.var_key, stats.hits, stats.misses, stats.flushes
            );
        }
        state.cache = None;
        Ok(())
    }

    pub fn cache_exists(&self) -> bool {
        self.state.lock().cache.is_some()
    }

    pub fn resident_count(&self) -> usize {
        self.state
            .lock()
            .cache
            .as_ref()
            .map(|cache| cache.resident_count())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> Option<CacheStats> {
        self.state.lock().cache.as_ref().map(|cache| cache.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zcache_core::MemoryStore;

    fn variable(store: &Arc<MemoryStore>) -> ArrayVariable {
        let store: Arc<dyn ChunkStore> = Arc::clone(store) as Arc<dyn ChunkStore>;
        ArrayVariable::new("grp/temp", 2, 8, DimensionSeparator::Dot, store).unwrap()
    }

    #[test]
    fn test_cache_created_lazily() {
        let store = Arc::new(MemoryStore::new());
        let var = variable(&store);
        assert!(!var.cache_exists());
        assert_eq!(var.resident_count(), 0);

        let (data, synthesized) = var.read_chunk([0, 0]).unwrap();
        assert_eq!(data, vec![0u8; 8]);
        assert!(synthesized);
        assert!(var.cache_exists());
        assert_eq!(var.resident_count(), 1);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let store: Arc<dyn ChunkStore> = Arc::new(MemoryStore::new());
        assert!(ArrayVariable::new("v", 1, 0, DimensionSeparator::Dot, store).is_err());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let store = Arc::new(MemoryStore::new());
        let var = variable(&store);
        let bad = CacheSettings {
            size_bytes: 64,
            nelems: 10,
            preemption: 1.5,
        };
        assert!(matches!(var.set_chunk_cache(bad), Err(CacheError::InvalidArgument(_))));
        assert_eq!(var.chunk_cache_settings(), CacheSettings::default());
    }

    #[test]
    fn test_set_chunk_cache_before_creation() {
        let store = Arc::new(MemoryStore::new());
        let var = variable(&store);
        var.set_chunk_cache(CacheSettings::new(16, 2, 0.5).unwrap()).unwrap();

        var.with_cache(|cache| {
            assert_eq!(cache.capacity(), 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_set_chunk_cache_resizes_live_cache() {
        let store = Arc::new(MemoryStore::new());
        let var = variable(&store);
        var.write_chunk([1, 1], &[3; 8]).unwrap();
        assert_eq!(store.object_count(), 0);

        var.set_chunk_cache(CacheSettings::new(80, 10, 0.75).unwrap()).unwrap();

        assert_eq!(var.resident_count(), 0);
        assert_eq!(store.object("grp/temp/1.1").unwrap(), vec![3; 8]);
        var.with_cache(|cache| {
            assert_eq!(cache.capacity(), 10);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_fill_value_applies_to_live_cache() {
        let store = Arc::new(MemoryStore::new());
        let var = variable(&store);
        var.read_chunk([0, 0]).unwrap();

        assert!(var.set_fill_value(Some(vec![1, 2, 3])).is_err());
        var.set_fill_value(Some(vec![0xFF, 0x7F])).unwrap();

        let (data, synthesized) = var.read_chunk([0, 1]).unwrap();
        assert!(synthesized);
        assert_eq!(data, [0xFFu8, 0x7F].repeat(4));
    }

    #[test]
    fn test_write_chunk_length_checked() {
        let store = Arc::new(MemoryStore::new());
        let var = variable(&store);
        assert!(matches!(
            var.write_chunk([0, 0], &[1; 4]),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(!var.cache_exists());
    }

    #[test]
    fn test_flush_and_close() {
        let store = Arc::new(MemoryStore::new());
        let var = variable(&store);
        var.flush().unwrap();

        var.write_chunk([2, 4], &[9; 8]).unwrap();
        var.flush().unwrap();
        assert_eq!(store.object("grp/temp/2.4").unwrap(), vec![9; 8]);

        var.write_chunk([2, 5], &[8; 8]).unwrap();
        var.close().unwrap();
        assert!(!var.cache_exists());
        assert_eq!(store.object("grp/temp/2.5").unwrap(), vec![8; 8]);

        // A closed variable reopens its cache on demand
        let (data, synthesized) = var.read_chunk([2, 4]).unwrap();
        assert_eq!(data, vec![9; 8]);
        assert!(!synthesized);
    }

    #[test]
    fn test_from_config() {
        let store: Arc<dyn ChunkStore> = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        config.cache.size_bytes = 32;
        config.cache.dimension_separator = DimensionSeparator::Slash;
        config.cache.fill_value = Some(vec![7]);

        let var = ArrayVariable::from_config("v", 2, 8, &config, store).unwrap();
        assert_eq!(var.chunk_cache_settings().size_bytes, 32);

        let (data, _) = var.read_chunk([1, 0]).unwrap();
        assert_eq!(data, vec![7; 8]);
        var.with_cache(|cache| {
            assert_eq!(cache.capacity(), 4);
            assert_eq!(cache.separator(), DimensionSeparator::Slash);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_from_config_read_only() {
        let store: Arc<dyn ChunkStore> = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        config.store.writable = false;

        let var = ArrayVariable::from_config("v", 1, 8, &config, store).unwrap();
        var.read_chunk([0]).unwrap();
        var.with_cache(|cache| {
            assert!(!cache.is_writable());
            assert_eq!(cache.dirty_count(), 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_shared_across_threads() {
        let store = Arc::new(MemoryStore::new());
        let var = variable(&store);

        std::thread::scope(|scope| {
            for t in 0..4u64 {
                let var = &var;
                scope.spawn(move || {
                    for i in 0..8u64 {
                        var.write_chunk([t, i], &[t as u8; 8]).unwrap();
                    }
                });
            }
        });

        var.close().unwrap();
        assert_eq!(store.object_count(), 32);
        assert_eq!(store.object("grp/temp/3.7").unwrap(), vec![3; 8]);
    }
}
