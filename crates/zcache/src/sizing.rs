//! Cache sizing: translate a byte budget into an entry count
//!
//! The budget is treated as fixed and the entry count is derived from it:
//! `capacity = max(1, floor(byte_budget / chunk_byte_size))`.

use zcache_core::CacheError;

/// Number of whole chunks that fit in `byte_budget`, never less than one
pub fn capacity_for(byte_budget: u64, chunk_byte_size: usize) -> usize {
    if chunk_byte_size == 0 {
        return 1;
    }
    let entries = byte_budget / chunk_byte_size as u64;
    usize::try_from(entries).unwrap_or(usize::MAX).max(1)
}

/// Current sizing parameters of one chunk cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheSizing {
    chunk_byte_size: usize,
    capacity: usize,
}

impl CacheSizing {
    pub fn new(chunk_byte_size: usize, byte_budget: u64) -> Result<Self, CacheError> {
        if chunk_byte_size == 0 {
            return Err(CacheError::invalid("chunk byte size must be non-zero"));
        }
        Ok(Self {
            chunk_byte_size,
            capacity: capacity_for(byte_budget, chunk_byte_size),
        })
    }

    pub fn chunk_byte_size(&self) -> usize {
        self.chunk_byte_size
    }

    /// Maximum number of resident entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Recompute capacity for a new budget
    pub fn set_budget(&mut self, byte_budget: u64) {
        self.capacity = capacity_for(byte_budget, self.chunk_byte_size);
    }

    /// Recompute capacity for a new chunk size and budget
    pub fn reconfigure(&mut self, chunk_byte_size: usize, byte_budget: u64) -> Result<(), CacheError> {
        *self = Self::new(chunk_byte_size, byte_budget)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_floor_division() {
        assert_eq!(capacity_for(1024, 100), 10);
        assert_eq!(capacity_for(1000, 100), 10);
        assert_eq!(capacity_for(999, 100), 9);
    }

    #[test]
    fn test_capacity_minimum_one() {
        assert_eq!(capacity_for(0, 100), 1);
        assert_eq!(capacity_for(50, 100), 1);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(matches!(
            CacheSizing::new(0, 1024),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_budget_is_idempotent() {
        let mut sizing = CacheSizing::new(64, 640).unwrap();
        assert_eq!(sizing.capacity(), 10);

        sizing.set_budget(128);
        sizing.set_budget(128);
        assert_eq!(sizing.capacity(), 2);
    }

    #[test]
    fn test_reconfigure() {
        let mut sizing = CacheSizing::new(64, 640).unwrap();
        sizing.reconfigure(32, 640).unwrap();
        assert_eq!(sizing.chunk_byte_size(), 32);
        assert_eq!(sizing.capacity(), 20);

        assert!(sizing.reconfigure(0, 640).is_err());
        assert_eq!(sizing.chunk_byte_size(), 32);
    }
}
