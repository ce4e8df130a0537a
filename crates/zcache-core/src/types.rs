//! Core type definitions for zcache
//!
//! These types describe chunks and how they are addressed; they are shared
//! by the cache, the store adapters, and the configuration layer.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::path;
use crate::{DEFAULT_CHUNK_CACHE_NELEMS, DEFAULT_CHUNK_CACHE_PREEMPTION, DEFAULT_CHUNK_CACHE_SIZE};

/// Position of a chunk in its array's chunk grid.
///
/// The hash of the index vector is computed once at construction and reused
/// for every lookup, so the `Hash` impl only feeds that precomputed value.
/// Equality still compares the full index vector.
#[derive(Clone, Debug)]
pub struct ChunkCoords {
    indices: Vec<u64>,
    hash: u64,
}

impl ChunkCoords {
    /// Create coordinates from a chunk index vector
    pub fn new(indices: impl Into<Vec<u64>>) -> Self {
        let indices = indices.into();
        let hash = hash_indices(&indices);
        Self { indices, hash }
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    /// Precomputed hash of the index vector
    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

fn hash_indices(indices: &[u64]) -> u64 {
    let mut hasher = DefaultHasher::new();
    indices.hash(&mut hasher);
    hasher.finish()
}

impl PartialEq for ChunkCoords {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.indices == other.indices
    }
}

impl Eq for ChunkCoords {}

impl Hash for ChunkCoords {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl From<Vec<u64>> for ChunkCoords {
    fn from(indices: Vec<u64>) -> Self {
        Self::new(indices)
    }
}

impl From<&[u64]> for ChunkCoords {
    fn from(indices: &[u64]) -> Self {
        Self::new(indices.to_vec())
    }
}

impl<const N: usize> From<[u64; N]> for ChunkCoords {
    fn from(indices: [u64; N]) -> Self {
        Self::new(indices.to_vec())
    }
}

impl fmt::Display for ChunkCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, index) in self.indices.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", index)?;
        }
        write!(f, ")")
    }
}

/// Character joining coordinate components in a chunk key
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub enum DimensionSeparator {
    /// `.` - the Zarr v2 default
    #[default]
    Dot,
    /// `/` - nested directory layout
    Slash,
}

impl DimensionSeparator {
    pub const fn as_char(self) -> char {
        match self {
            DimensionSeparator::Dot => '.',
            DimensionSeparator::Slash => '/',
        }
    }
}

impl TryFrom<char> for DimensionSeparator {
    type Error = CacheError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            '.' => Ok(DimensionSeparator::Dot),
            '/' => Ok(DimensionSeparator::Slash),
            other => Err(CacheError::invalid(format!(
                "illegal dimension separator {:?} (expected '.' or '/')",
                other
            ))),
        }
    }
}

impl From<DimensionSeparator> for char {
    fn from(sep: DimensionSeparator) -> Self {
        sep.as_char()
    }
}

impl FromStr for DimensionSeparator {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => DimensionSeparator::try_from(c),
            _ => Err(CacheError::invalid(format!(
                "dimension separator must be a single character, got {:?}",
                s
            ))),
        }
    }
}

impl fmt::Display for DimensionSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Composite key of a chunk object: the owning variable's storage key plus
/// the chunk key derived from the coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub var_key: String,
    pub chunk_key: String,
}

impl ChunkKey {
    /// Build the composite key for a chunk of a variable
    ///
    /// `var_key` is expected to be normalized already.
    pub fn new(var_key: &str, indices: &[u64], separator: DimensionSeparator) -> Self {
        Self {
            var_key: var_key.to_string(),
            chunk_key: path::build_chunk_key(indices, separator),
        }
    }

    /// Full object path in the backing store
    pub fn path(&self) -> String {
        path::chunk_path(&self.var_key, &self.chunk_key)
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// User-requested chunk cache settings for one variable.
///
/// Only `size_bytes` drives the cache capacity; the slot count is derived
/// from it. `nelems` and `preemption` are kept so they can be reported back.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Cache budget in bytes
    pub size_bytes: u64,
    /// Requested number of slots
    pub nelems: usize,
    /// Preemption hint in [0.0, 1.0]
    pub preemption: f32,
}

impl CacheSettings {
    pub fn new(size_bytes: u64, nelems: usize, preemption: f32) -> Result<Self, CacheError> {
        let settings = Self {
            size_bytes,
            nelems,
            preemption,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if !(0.0..=1.0).contains(&self.preemption) {
            return Err(CacheError::invalid(format!(
                "preemption must be within [0, 1], got {}",
                self.preemption
            )));
        }
        Ok(())
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            size_bytes: DEFAULT_CHUNK_CACHE_SIZE,
            nelems: DEFAULT_CHUNK_CACHE_NELEMS,
            preemption: DEFAULT_CHUNK_CACHE_PREEMPTION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_coords_equality_and_hash() {
        let a = ChunkCoords::from([2, 4]);
        let b = ChunkCoords::new(vec![2, 4]);
        let c = ChunkCoords::from([4, 2]);

        assert_eq!(a, b);
        assert_eq!(a.hash_value(), b.hash_value());
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }

    #[test]
    fn test_coords_display() {
        assert_eq!(ChunkCoords::from([10, 0, 5]).to_string(), "(10,0,5)");
        assert_eq!(ChunkCoords::new(Vec::new()).to_string(), "()");
    }

    #[test]
    fn test_separator_parsing() {
        assert_eq!(DimensionSeparator::try_from('.').unwrap(), DimensionSeparator::Dot);
        assert_eq!("/".parse::<DimensionSeparator>().unwrap(), DimensionSeparator::Slash);
        assert!(DimensionSeparator::try_from(':').is_err());
        assert!("./".parse::<DimensionSeparator>().is_err());
        assert!(DimensionSeparator::try_from('-').is_err());
    }

    #[test]
    fn test_chunk_key_path() {
        let key = ChunkKey::new("group/temperature", &[2, 4], DimensionSeparator::Dot);
        assert_eq!(key.chunk_key, "2.4");
        assert_eq!(key.path(), "group/temperature/2.4");

        let root = ChunkKey::new("", &[0, 0], DimensionSeparator::Slash);
        assert_eq!(root.path(), "0/0");
    }

    #[test]
    fn test_settings_validation() {
        assert!(CacheSettings::new(1024, 10, 0.5).is_ok());
        assert!(CacheSettings::new(1024, 10, 1.0).is_ok());
        assert!(matches!(
            CacheSettings::new(1024, 10, 1.5),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(CacheSettings::new(1024, 10, -0.1).is_err());
    }
}
