//! Error types for chunk caching and store access

use thiserror::Error;

/// Errors reported by a backing store adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store holds no object under this key
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("store I/O failed for {key}: {message}")]
    Io { key: String, message: String },

    /// The object exists but is smaller than the requested range
    #[error("short transfer for {key}: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        key: String,
        expected: usize,
        actual: usize,
    },

    #[error("store is read-only, cannot write {0}")]
    ReadOnly(String),
}

impl StoreError {
    /// Build an I/O error from any displayable cause
    pub fn io(key: &str, cause: impl std::fmt::Display) -> Self {
        StoreError::Io {
            key: key.to_string(),
            message: cause.to_string(),
        }
    }

    /// True when the store reported that the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Cache-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The lookup structure already holds these coordinates
    #[error("duplicate cache entry for chunk {0}")]
    DuplicateEntry(String),
}

impl CacheError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        CacheError::InvalidArgument(msg.into())
    }

    /// True for failures that came from the backing store
    pub fn is_store_error(&self) -> bool {
        matches!(self, CacheError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_converts() {
        let err: CacheError = StoreError::io("var/0.0", "disk on fire").into();
        assert!(err.is_store_error());
        assert_eq!(
            err.to_string(),
            "store I/O failed for var/0.0: disk on fire"
        );
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(StoreError::NotFound("a".into()).is_not_found());
        assert!(!StoreError::ReadOnly("a".into()).is_not_found());
    }

    #[test]
    fn test_short_transfer_message() {
        let err = StoreError::ShortTransfer {
            key: "x/1".into(),
            expected: 64,
            actual: 10,
        };
        assert_eq!(
            err.to_string(),
            "short transfer for x/1: expected 64 bytes, got 10"
        );
    }
}
