//! Write-back LRU chunk cache
//!
//! One [`ChunkCache`] serves one array variable. It keeps a bounded working
//! set of whole-chunk buffers (post-decompression raw bytes), fetches missing
//! chunks from the backing store on read, defers writes until a chunk is
//! evicted or flushed, and synthesizes fill-value chunks for objects the
//! store does not hold yet.
//!
//! Lookup order on read: resident entry → store → synthesized fill chunk.
//!
//! All operations take `&mut self`. A buffer returned by [`ChunkCache::read`]
//! or [`ChunkCache::write`] borrows the cache, so it cannot be held across a
//! call that might evict its entry.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use zcache_core::{
    normalize_var_key, CacheError, ChunkCoords, ChunkKey, ChunkStore, DimensionSeparator,
    StoreError, DEFAULT_CHUNK_CACHE_SIZE,
};

use crate::entry::{allocate_zeroed, CacheEntry};
use crate::recency::RecencyIndex;
use crate::sizing::CacheSizing;

/// Parameters for creating a chunk cache
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Size of every chunk's raw buffer in bytes
    pub chunk_byte_size: usize,
    pub separator: DimensionSeparator,
    /// Cache budget in bytes
    pub byte_budget: u64,
    /// Number of coordinate dimensions (0 for scalar variables)
    pub rank: usize,
    /// Storage key of the owning variable
    pub var_key: String,
    /// Pattern tiled over absent chunks; zero-fill when `None`
    pub fill_value: Option<Vec<u8>>,
    /// Allow write-back; combined with the store's own writable flag
    pub writable: bool,
}

impl CacheOptions {
    pub fn new(chunk_byte_size: usize, separator: DimensionSeparator, byte_budget: u64) -> Self {
        Self {
            chunk_byte_size,
            separator,
            byte_budget,
            rank: 1,
            var_key: String::new(),
            fill_value: None,
            writable: true,
        }
    }

    pub fn rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    pub fn var_key(mut self, var_key: impl Into<String>) -> Self {
        self.var_key = var_key.into();
        self
    }

    pub fn fill_value(mut self, pattern: Vec<u8>) -> Self {
        self.fill_value = Some(pattern);
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::new(0, DimensionSeparator::Dot, DEFAULT_CHUNK_CACHE_SIZE)
    }
}

/// Result of a cache read
#[derive(Debug)]
pub struct ChunkRead<'a> {
    /// The chunk's raw bytes
    pub data: &'a [u8],
    /// True when the chunk was absent from the store and was materialized
    /// from the fill value by this read
    pub synthesized: bool,
}

/// Counters describing cache activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses answered with fill-value data
    pub synthesized: u64,
    pub evictions: u64,
    /// Successful chunk write-backs (eviction or flush)
    pub flushes: u64,
    pub flush_errors: u64,
}

/// Write-back LRU cache of whole chunks for one array variable
pub struct ChunkCache {
    store: Arc<dyn ChunkStore>,
    var_key: String,
    separator: DimensionSeparator,
    rank: usize,
    sizing: CacheSizing,
    /// Synthesized entries are marked dirty only when this is set
    writable: bool,
    fill_value: Option<Vec<u8>>,
    /// Chunk-sized tiling of `fill_value`, built on first use
    fill_buffer: Option<Vec<u8>>,
    index: RecencyIndex,
    stats: CacheStats,
}

impl ChunkCache {
    /// Create a cache.
    ///
    /// Fails with [`CacheError::InvalidArgument`] for a zero chunk size, an
    /// invalid variable key, or a fill pattern that does not tile the chunk.
    pub fn new(options: CacheOptions, store: Arc<dyn ChunkStore>) -> Result<Self, CacheError> {
        let sizing = CacheSizing::new(options.chunk_byte_size, options.byte_budget)?;
        let var_key = normalize_var_key(&options.var_key)?;
        if let Some(pattern) = &options.fill_value {
            check_fill_pattern(pattern, sizing.chunk_byte_size())?;
        }
        let writable = options.writable && store.is_writable();

        debug!(
            "chunk_cache[{}]: created, chunk={} bytes, capacity={} entries, writable={}",
            var_key,
            sizing.chunk_byte_size(),
            sizing.capacity(),
            writable
        );

        Ok(Self {
            store,
            var_key,
            separator: options.separator,
            rank: options.rank,
            sizing,
            writable,
            fill_value: options.fill_value,
            fill_buffer: None,
            index: RecencyIndex::new(),
            stats: CacheStats::default(),
        })
    }

    /// Read a chunk, fetching it from the store on a miss.
    ///
    /// A chunk the store does not hold is materialized from the fill value
    /// (or zeros) and reported with `synthesized = true`. It is marked dirty
    /// when the store is writable, so it is persisted on eviction or flush.
    pub fn read(&mut self, coords: impl Into<ChunkCoords>) -> Result<ChunkRead<'_>, CacheError> {
        let coords = self.check_rank(coords.into())?;

        if self.index.contains(&coords) {
            self.stats.hits += 1;
            trace!("chunk_cache[{}]: read hit {}", self.var_key, coords);
            let entry = self.promote(&coords)?;
            return Ok(ChunkRead {
                data: entry.data(),
                synthesized: false,
            });
        }

        self.stats.misses += 1;

        // Nothing is evicted until the new entry is fully built
        let mut entry =
            CacheEntry::allocate(coords, &self.var_key, self.separator, self.chunk_byte_size())?;
        let synthesized = match entry.fetch_from(self.store.as_ref()) {
            Ok(()) => false,
            Err(e) if e.is_not_found() => {
                match self.fill_chunk()? {
                    Some(fill) => entry.data_mut().copy_from_slice(fill),
                    None => entry.data_mut().fill(0),
                }
                if self.writable {
                    entry.mark_dirty();
                }
                self.stats.synthesized += 1;
                true
            }
            Err(e) => {
                warn!("chunk_cache[{}]: fetch of {} failed: {}", self.var_key, entry.path(), e);
                return Err(e.into());
            }
        };

        trace!(
            "chunk_cache[{}]: read miss {} (synthesized={})",
            self.var_key,
            entry.path(),
            synthesized
        );

        self.make_room()?;
        let entry = self.index.insert(entry)?;
        Ok(ChunkRead {
            data: entry.data(),
            synthesized,
        })
    }

    /// Obtain a chunk buffer for writing.
    ///
    /// On a hit the resident buffer is returned for in-place mutation. On a
    /// miss a zero-filled buffer is inserted without reading the store; the
    /// caller is expected to overwrite the whole chunk, or to `read` first
    /// when only part of it changes. Either way the entry becomes dirty.
    pub fn write(&mut self, coords: impl Into<ChunkCoords>) -> Result<&mut [u8], CacheError> {
        let coords = self.check_rank(coords.into())?;

        if !self.writable {
            let key = ChunkKey::new(&self.var_key, coords.indices(), self.separator);
            return Err(StoreError::ReadOnly(key.path()).into());
        }

        if self.index.contains(&coords) {
            self.stats.hits += 1;
            trace!("chunk_cache[{}]: write hit {}", self.var_key, coords);
            let entry = self.promote(&coords)?;
            entry.mark_dirty();
            return Ok(entry.data_mut());
        }

        self.stats.misses += 1;

        let mut entry =
            CacheEntry::allocate(coords, &self.var_key, self.separator, self.chunk_byte_size())?;
        entry.mark_dirty();
        trace!("chunk_cache[{}]: write miss {}", self.var_key, entry.path());

        self.make_room()?;
        let entry = self.index.insert(entry)?;
        Ok(entry.data_mut())
    }

    /// Write every dirty entry back to the store.
    ///
    /// Stops at the first failure: entries flushed so far stay clean, the
    /// rest stay dirty, so the call can be retried.
    pub fn flush_all(&mut self) -> Result<(), CacheError> {
        if self.index.is_empty() {
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let mut flushed = 0usize;
        for entry in self.index.iter_mut().filter(|e| e.is_dirty()) {
            if let Err(e) = entry.flush_to(store.as_ref()) {
                self.stats.flush_errors += 1;
                warn!(
                    "chunk_cache[{}]: flush of {} failed after {} chunks: {}",
                    self.var_key,
                    entry.path(),
                    flushed,
                    e
                );
                self.stats.flushes += flushed as u64;
                return Err(e.into());
            }
            flushed += 1;
        }
        self.stats.flushes += flushed as u64;

        debug!("chunk_cache[{}]: flushed {} chunks", self.var_key, flushed);
        Ok(())
    }

    /// Write back a single resident chunk if it is dirty
    pub fn flush(&mut self, coords: impl Into<ChunkCoords>) -> Result<(), CacheError> {
        let coords = self.check_rank(coords.into())?;
        let store = Arc::clone(&self.store);
        let Some(entry) = self.index.peek_mut(&coords) else {
            return Ok(());
        };
        if !entry.is_dirty() {
            return Ok(());
        }
        match entry.flush_to(store.as_ref()) {
            Ok(()) => {
                self.stats.flushes += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.flush_errors += 1;
                Err(e.into())
            }
        }
    }

    /// Apply a new byte budget.
    ///
    /// Every resident entry is evicted (dirty ones are flushed), capacity is
    /// recomputed, and the fill buffer is dropped to be rebuilt on next use.
    /// `resize(0)` followed by a larger budget forces a full flush-and-reset.
    /// All entries are discarded even if a flush fails; the first failure is
    /// returned.
    pub fn resize(&mut self, byte_budget: u64) -> Result<(), CacheError> {
        let result = self.evict_all();
        self.sizing.set_budget(byte_budget);
        self.fill_buffer = None;
        debug!(
            "chunk_cache[{}]: resized to {} bytes, capacity={} entries",
            self.var_key,
            byte_budget,
            self.sizing.capacity()
        );
        result
    }

    /// Change the chunk size and budget together.
    ///
    /// Like [`resize`](Self::resize), but also replaces the chunk size. The
    /// configured fill pattern must still tile the new chunk size.
    pub fn reconfigure(&mut self, chunk_byte_size: usize, byte_budget: u64) -> Result<(), CacheError> {
        let mut sizing = self.sizing;
        sizing.reconfigure(chunk_byte_size, byte_budget)?;
        if let Some(pattern) = &self.fill_value {
            check_fill_pattern(pattern, chunk_byte_size)?;
        }
        let result = self.evict_all();
        self.sizing = sizing;
        self.fill_buffer = None;
        debug!(
            "chunk_cache[{}]: reconfigured, chunk={} bytes, capacity={} entries",
            self.var_key,
            chunk_byte_size,
            self.sizing.capacity()
        );
        result
    }

    /// Replace the fill value pattern used for absent chunks
    pub fn set_fill_value(&mut self, pattern: Option<Vec<u8>>) -> Result<(), CacheError> {
        if let Some(pattern) = &pattern {
            check_fill_pattern(pattern, self.chunk_byte_size())?;
        }
        self.fill_value = pattern;
        self.fill_buffer = None;
        Ok(())
    }

    /// Number of resident entries
    pub fn resident_count(&self) -> usize {
        self.index.len()
    }

    /// Size of every entry's buffer
    pub fn entry_byte_size(&self) -> usize {
        self.sizing.chunk_byte_size()
    }

    /// Maximum number of resident entries
    pub fn capacity(&self) -> usize {
        self.sizing.capacity()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn separator(&self) -> DimensionSeparator {
        self.separator
    }

    pub fn var_key(&self) -> &str {
        &self.var_key
    }

    /// Whether write-back is enabled
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Check residency without affecting recency
    pub fn contains(&self, coords: impl Into<ChunkCoords>) -> bool {
        self.index.contains(&coords.into())
    }

    /// Whether a resident chunk has unflushed modifications
    pub fn is_dirty(&self, coords: impl Into<ChunkCoords>) -> bool {
        self.index
            .peek(&coords.into())
            .map(|entry| entry.is_dirty())
            .unwrap_or(false)
    }

    pub fn dirty_count(&self) -> usize {
        self.index.dirty_count()
    }

    /// Resident coordinates, most recently used first
    pub fn resident_coords(&self) -> Vec<ChunkCoords> {
        self.index.iter().map(|entry| entry.coords().clone()).collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn chunk_byte_size(&self) -> usize {
        self.sizing.chunk_byte_size()
    }

    fn check_rank(&self, coords: ChunkCoords) -> Result<ChunkCoords, CacheError> {
        if coords.rank() != self.rank {
            return Err(CacheError::invalid(format!(
                "chunk {} has rank {}, variable has rank {}",
                coords,
                coords.rank(),
                self.rank
            )));
        }
        Ok(coords)
    }

    /// Move a resident entry to the most-recently-used position
    fn promote(&mut self, coords: &ChunkCoords) -> Result<&mut CacheEntry, CacheError> {
        self.index
            .get_mut(coords)
            .ok_or_else(|| CacheError::invalid(format!("chunk {} is not resident", coords)))
    }

    /// Evict until one more entry fits
    fn make_room(&mut self) -> Result<(), CacheError> {
        let limit = self.sizing.capacity().saturating_sub(1);
        self.evict_to(limit)
    }

    /// Evict least-recently-used entries until at most `limit` remain.
    ///
    /// A dirty victim is flushed before it is dropped. If that flush fails
    /// the victim is dropped anyway and the error is returned, since its
    /// modifications may now be lost.
    fn evict_to(&mut self, limit: usize) -> Result<(), CacheError> {
        while self.index.len() > limit {
            let Some(mut victim) = self.index.pop_lru() else {
                break;
            };
            self.stats.evictions += 1;

            if victim.is_dirty() {
                if let Err(e) = victim.flush_to(self.store.as_ref()) {
                    self.stats.flush_errors += 1;
                    warn!(
                        "chunk_cache[{}]: dropping {} after failed write-back: {}",
                        self.var_key,
                        victim.path(),
                        e
                    );
                    return Err(e.into());
                }
                self.stats.flushes += 1;
            }
            debug!("chunk_cache[{}]: evicted {}", self.var_key, victim.path());
        }
        Ok(())
    }

    /// Evict everything, continuing past failures and returning the first one
    fn evict_all(&mut self) -> Result<(), CacheError> {
        let mut first_error: Option<CacheError> = None;
        for mut victim in self.index.drain() {
            self.stats.evictions += 1;
            if !victim.is_dirty() {
                continue;
            }
            match victim.flush_to(self.store.as_ref()) {
                Ok(()) => self.stats.flushes += 1,
                Err(e) => {
                    self.stats.flush_errors += 1;
                    warn!(
                        "chunk_cache[{}]: dropping {} after failed write-back: {}",
                        self.var_key,
                        victim.path(),
                        e
                    );
                    first_error.get_or_insert(e.into());
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Chunk-sized fill buffer, built from the fill pattern on first use
    fn fill_chunk(&mut self) -> Result<Option<&[u8]>, CacheError> {
        let Some(pattern) = &self.fill_value else {
            return Ok(None);
        };
        if self.fill_buffer.is_none() {
            let mut buf = allocate_zeroed(self.sizing.chunk_byte_size())?;
            for slot in buf.chunks_mut(pattern.len()) {
                slot.copy_from_slice(&pattern[..slot.len()]);
            }
            self.fill_buffer = Some(buf);
        }
        Ok(self.fill_buffer.as_deref())
    }
}

impl Drop for ChunkCache {
    fn drop(&mut self) {
        let dirty = self.index.dirty_count();
        if dirty > 0 {
            warn!(
                "chunk_cache[{}]: discarding {} unflushed chunks",
                self.var_key, dirty
            );
        }
    }
}

fn check_fill_pattern(pattern: &[u8], chunk_byte_size: usize) -> Result<(), CacheError> {
    if pattern.is_empty() || chunk_byte_size % pattern.len() != 0 {
        return Err(CacheError::invalid(format!(
            "fill value of {} bytes does not tile a {}-byte chunk",
            pattern.len(),
            chunk_byte_size
        )));
    }
    Ok(())
}
