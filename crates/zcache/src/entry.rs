//! In-memory record for one resident chunk

use zcache_core::{CacheError, ChunkCoords, ChunkKey, ChunkStore, DimensionSeparator, StoreError};

/// One resident chunk.
///
/// The entry exclusively owns its data buffer and its object path. The
/// buffer is always exactly the cache's chunk size.
#[derive(Debug)]
pub struct CacheEntry {
    coords: ChunkCoords,
    /// Object path in the store, derived once from the composite key
    path: String,
    data: Vec<u8>,
    dirty: bool,
}

impl CacheEntry {
    /// Allocate a clean, zero-filled entry.
    ///
    /// Allocation failure is reported as [`CacheError::OutOfMemory`] rather
    /// than aborting the process.
    pub(crate) fn allocate(
        coords: ChunkCoords,
        var_key: &str,
        separator: DimensionSeparator,
        chunk_byte_size: usize,
    ) -> Result<Self, CacheError> {
        let data = allocate_zeroed(chunk_byte_size)?;
        let path = ChunkKey::new(var_key, coords.indices(), separator).path();
        Ok(Self {
            coords,
            path,
            data,
            dirty: false,
        })
    }

    pub fn coords(&self) -> &ChunkCoords {
        &self.coords
    }

    /// Object path in the backing store
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Load the whole chunk from the store into the buffer
    pub(crate) fn fetch_from(&mut self, store: &dyn ChunkStore) -> Result<(), StoreError> {
        store.read(&self.path, 0, &mut self.data)
    }

    /// Write the whole chunk back and clear the dirty flag on success
    pub(crate) fn flush_to(&mut self, store: &dyn ChunkStore) -> Result<(), StoreError> {
        store.write(&self.path, 0, &self.data)?;
        self.dirty = false;
        Ok(())
    }
}

/// Allocate a zero-filled buffer, reporting allocation failure as an error
pub(crate) fn allocate_zeroed(len: usize) -> Result<Vec<u8>, CacheError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| CacheError::OutOfMemory { bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}
