//! zcache core - Shared types, chunk keys, store interface, and configuration
//!
//! This crate contains the foundational pieces used by the chunk cache.
//! It has no knowledge of caching policy; it only describes chunks, how
//! they are addressed in a backing store, and how the store is reached.

pub mod config;
pub mod error;
pub mod path;
pub mod store;
pub mod types;

pub use config::{CacheConfig, Config, ConfigError, StoreConfig};
pub use error::*;
pub use path::{build_chunk_key, chunk_path, normalize_var_key, parse_chunk_key};
pub use store::{ChunkStore, MemoryStore};
pub use types::*;

/// Default per-variable chunk cache budget in bytes (16 MB)
pub const DEFAULT_CHUNK_CACHE_SIZE: u64 = 16 * 1024 * 1024;

/// Default requested number of cache slots
pub const DEFAULT_CHUNK_CACHE_NELEMS: usize = 4133;

/// Default preemption hint
pub const DEFAULT_CHUNK_CACHE_PREEMPTION: f32 = 0.75;

/// Maximum length of a variable storage key in bytes
pub const MAX_PATH_LEN: usize = 4096;
