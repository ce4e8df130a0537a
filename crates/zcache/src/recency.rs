//! Recency-indexed lookup structure
//!
//! A single [`LruCache`] serves as both the hash index and the recency
//! ordering: every hash-map node is also linked into a doubly-linked list,
//! so lookup, promote-to-front and least-recently-used selection are all
//! O(1) and the two views cannot drift apart.
//!
//! The structure is unbounded. Capacity is enforced by the chunk cache,
//! which must flush dirty victims before they are dropped.

use lru::LruCache;

use zcache_core::{CacheError, ChunkCoords};

use crate::entry::CacheEntry;

/// Resident entries, keyed by coordinates, ordered most- to least-recently used
pub struct RecencyIndex {
    entries: LruCache<ChunkCoords, CacheEntry>,
}

impl RecencyIndex {
    pub fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    /// Look up an entry and promote it to most-recently-used
    pub fn get_mut(&mut self, coords: &ChunkCoords) -> Option<&mut CacheEntry> {
        self.entries.get_mut(coords)
    }

    /// Look up an entry without affecting recency
    pub fn peek(&self, coords: &ChunkCoords) -> Option<&CacheEntry> {
        self.entries.peek(coords)
    }

    /// Mutable lookup without affecting recency
    pub fn peek_mut(&mut self, coords: &ChunkCoords) -> Option<&mut CacheEntry> {
        self.entries.peek_mut(coords)
    }

    /// Check residency (without affecting recency)
    pub fn contains(&self, coords: &ChunkCoords) -> bool {
        self.entries.contains(coords)
    }

    /// Insert a new entry at the most-recently-used position.
    ///
    /// Inserting coordinates that are already resident is refused with
    /// [`CacheError::DuplicateEntry`] and leaves the structure unchanged.
    pub fn insert(&mut self, entry: CacheEntry) -> Result<&mut CacheEntry, CacheError> {
        if self.entries.contains(entry.coords()) {
            return Err(CacheError::DuplicateEntry(entry.coords().to_string()));
        }
        let coords = entry.coords().clone();
        Ok(self.entries.get_or_insert_mut(coords, || entry))
    }

    /// Remove and return the least-recently-used entry
    pub fn pop_lru(&mut self) -> Option<CacheEntry> {
        self.entries.pop_lru().map(|(_, entry)| entry)
    }

    /// Remove every entry, least-recently-used first
    pub fn drain(&mut self) -> Vec<CacheEntry> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some((_, entry)) = self.entries.pop_lru() {
            drained.push(entry);
        }
        drained
    }

    /// Iterate from most- to least-recently-used
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter().map(|(_, entry)| entry)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CacheEntry> {
        self.entries.iter_mut().map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries with unflushed modifications
    pub fn dirty_count(&self) -> usize {
        self.iter().filter(|entry| entry.is_dirty()).count()
    }
}

impl Default for RecencyIndex {
    fn default() -> Self {
        Self::new()
    }
}
