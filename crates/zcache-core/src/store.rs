//! Backing store interface
//!
//! The chunk cache talks to its key-value object store through the
//! synchronous [`ChunkStore`] trait. Every call blocks until the store
//! answers; the cache performs no retries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::trace;

use crate::error::StoreError;

/// Synchronous key-value object store holding one object per chunk
pub trait ChunkStore: Send + Sync {
    /// Fill `buf` with `buf.len()` bytes of the object at `key`, starting at `offset`.
    ///
    /// Returns [`StoreError::NotFound`] when the object does not exist and
    /// [`StoreError::ShortTransfer`] when it holds fewer bytes than requested.
    fn read(&self, key: &str, offset: u64, buf: &mut [u8]) -> Result<(), StoreError>;

    /// Write `data` into the object at `key`, starting at `offset`,
    /// creating the object if needed.
    fn write(&self, key: &str, offset: u64, data: &[u8]) -> Result<(), StoreError>;

    /// Remove an object. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Whether writes are accepted
    fn is_writable(&self) -> bool {
        true
    }
}

/// In-memory object store
///
/// Counts every read and write so callers can observe how much store
/// traffic an operation caused.
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    writable: bool,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    /// Create an empty writable store
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            writable: true,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Create a store that rejects writes
    pub fn read_only(objects: HashMap<String, Vec<u8>>) -> Self {
        Self {
            objects: RwLock::new(objects),
            writable: false,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Place an object directly, bypassing the writable flag and counters
    pub fn insert_object(&self, key: impl Into<String>, data: Vec<u8>) {
        self.objects.write().insert(key.into(), data);
    }

    /// Copy of an object's bytes
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Sorted list of stored keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of `read` calls served (including misses)
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of successful `write` calls
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for MemoryStore {
    fn read(&self, key: &str, offset: u64, buf: &mut [u8]) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let objects = self.objects.read();
        let object = objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let start = usize::try_from(offset).map_err(|e| StoreError::io(key, e))?;
        let available = object.len().saturating_sub(start);
        if start > object.len() || available < buf.len() {
            return Err(StoreError::ShortTransfer {
                key: key.to_string(),
                expected: buf.len(),
                actual: available,
            });
        }

        buf.copy_from_slice(&object[start..start + buf.len()]);
        trace!("memory_store: read {} bytes from {}", buf.len(), key);
        Ok(())
    }

    fn write(&self, key: &str, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly(key.to_string()));
        }

        let start = usize::try_from(offset).map_err(|e| StoreError::io(key, e))?;
        let end = start
            .checked_add(data.len())
            .ok_or_else(|| StoreError::io(key, "write extends past the addressable range"))?;

        let mut objects = self.objects.write();
        let object = objects.entry(key.to_string()).or_default();
        // A put at offset 0 replaces the whole object
        if start == 0 {
            object.clear();
        }
        if object.len() < end {
            object.resize(end, 0);
        }
        object[start..end].copy_from_slice(data);

        self.writes.fetch_add(1, Ordering::Relaxed);
        trace!("memory_store: wrote {} bytes to {}", data.len(), key);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly(key.to_string()));
        }
        Ok(self.objects.write().remove(key).is_some())
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.read().contains_key(key))
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}
