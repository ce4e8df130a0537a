//! zcache - write-back chunk cache for chunked array storage
//!
//! This crate provides:
//! - A bounded LRU cache of whole, raw chunk buffers per array variable
//! - Deferred write-back of modified chunks to a pluggable object store
//! - Fill-value synthesis for chunks the store does not hold yet
//! - A directory-backed object store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ArrayVariable (Mutex)                       │
//! │  lazily creates the cache, applies settings changes         │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ &mut ChunkCache
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ChunkCache                             │
//! │  RecencyIndex (hash index + LRU order) of CacheEntry        │
//! │  CacheSizing: capacity = max(1, budget / chunk size)        │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ read / write whole objects
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │            ChunkStore (MemoryStore, DirectoryStore)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod dir_store;
pub mod entry;
pub mod recency;
pub mod sizing;
pub mod variable;

pub use cache::{CacheOptions, CacheStats, ChunkCache, ChunkRead};
pub use dir_store::DirectoryStore;
pub use entry::CacheEntry;
pub use recency::RecencyIndex;
pub use sizing::{capacity_for, CacheSizing};
pub use variable::ArrayVariable;

pub use zcache_core::{
    build_chunk_key, parse_chunk_key, CacheError, CacheSettings, ChunkCoords, ChunkKey,
    ChunkStore, Config, DimensionSeparator, MemoryStore, StoreError,
};
