//! Chunk key and object path construction
//!
//! A chunk key renders each chunk index as a decimal integer without leading
//! zeros, joined by the dimension separator. Given an array of shape
//! (10000, 10000) with chunks of (1000, 1000), chunk (0, 0) is stored under
//! `"0.0"` and chunk (2, 4) under `"2.4"`.
//!
//! The object path of a chunk is the variable's storage key and the chunk
//! key joined by `/`.

use std::fmt::Write;

use crate::error::CacheError;
use crate::types::DimensionSeparator;
use crate::MAX_PATH_LEN;

/// Build the chunk key string for a coordinate vector.
///
/// A rank-0 (scalar) variable has a single chunk, stored under `"0"`.
pub fn build_chunk_key(indices: &[u64], separator: DimensionSeparator) -> String {
    if indices.is_empty() {
        return "0".to_string();
    }

    let sep = separator.as_char();
    let mut key = String::with_capacity(indices.len() * 4);
    for (r, index) in indices.iter().enumerate() {
        if r > 0 {
            key.push(sep);
        }
        // Writing into a String cannot fail
        let _ = write!(key, "{}", index);
    }
    key
}

/// Parse a chunk key back into its index vector.
///
/// Rejects empty components, non-digits, and leading zeros so that
/// `parse_chunk_key(build_chunk_key(c)) == c` and nothing else parses.
pub fn parse_chunk_key(key: &str, separator: DimensionSeparator) -> Result<Vec<u64>, CacheError> {
    if key.is_empty() {
        return Err(CacheError::invalid("empty chunk key"));
    }

    key.split(separator.as_char())
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CacheError::invalid(format!(
                    "malformed chunk key component {:?} in {:?}",
                    part, key
                )));
            }
            if part.len() > 1 && part.starts_with('0') {
                return Err(CacheError::invalid(format!(
                    "leading zero in chunk key component {:?}",
                    part
                )));
            }
            part.parse::<u64>().map_err(|e| {
                CacheError::invalid(format!("chunk index {:?} out of range: {}", part, e))
            })
        })
        .collect()
}

/// Normalize a variable storage key.
///
/// Strips leading, trailing and repeated `/`. Rejects NUL bytes, `.` and
/// `..` components, and keys longer than [`MAX_PATH_LEN`].
pub fn normalize_var_key(var_key: &str) -> Result<String, CacheError> {
    if var_key.contains('\0') {
        return Err(CacheError::invalid("variable key contains null byte"));
    }

    if var_key.len() > MAX_PATH_LEN {
        return Err(CacheError::invalid(format!(
            "variable key too long: {} bytes (max {})",
            var_key.len(),
            MAX_PATH_LEN
        )));
    }

    let mut parts = Vec::new();
    for part in var_key.split('/') {
        match part {
            "" => continue,
            "." | ".." => {
                return Err(CacheError::invalid(format!(
                    "relative component {:?} not allowed in variable key",
                    part
                )));
            }
            name => parts.push(name),
        }
    }

    Ok(parts.join("/"))
}

/// Join a normalized variable key and a chunk key into an object path
pub fn chunk_path(var_key: &str, chunk_key: &str) -> String {
    if var_key.is_empty() {
        chunk_key.to_string()
    } else {
        format!("{}/{}", var_key, chunk_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_chunk_key_examples() {
        assert_eq!(build_chunk_key(&[0, 0], DimensionSeparator::Dot), "0.0");
        assert_eq!(build_chunk_key(&[2, 4], DimensionSeparator::Dot), "2.4");
        assert_eq!(build_chunk_key(&[10, 0, 5], DimensionSeparator::Slash), "10/0/5");
    }

    #[test]
    fn test_build_chunk_key_rank_one_and_scalar() {
        assert_eq!(build_chunk_key(&[7], DimensionSeparator::Dot), "7");
        assert_eq!(build_chunk_key(&[], DimensionSeparator::Dot), "0");
    }

    #[test]
    fn test_build_chunk_key_large_index() {
        assert_eq!(
            build_chunk_key(&[u64::MAX, 1], DimensionSeparator::Dot),
            "18446744073709551615.1"
        );
    }

    #[test]
    fn test_parse_chunk_key() {
        assert_eq!(parse_chunk_key("2.4", DimensionSeparator::Dot).unwrap(), vec![2, 4]);
        assert_eq!(
            parse_chunk_key("10/0/5", DimensionSeparator::Slash).unwrap(),
            vec![10, 0, 5]
        );
    }

    #[test]
    fn test_parse_chunk_key_rejects_malformed() {
        assert!(parse_chunk_key("", DimensionSeparator::Dot).is_err());
        assert!(parse_chunk_key("1..2", DimensionSeparator::Dot).is_err());
        assert!(parse_chunk_key("01.2", DimensionSeparator::Dot).is_err());
        assert!(parse_chunk_key("1.-2", DimensionSeparator::Dot).is_err());
        assert!(parse_chunk_key("1/2", DimensionSeparator::Dot).is_err());
        assert!(parse_chunk_key("99999999999999999999", DimensionSeparator::Dot).is_err());
    }

    #[test]
    fn test_normalize_var_key() {
        assert_eq!(normalize_var_key("/group/var/").unwrap(), "group/var");
        assert_eq!(normalize_var_key("a//b").unwrap(), "a/b");
        assert_eq!(normalize_var_key("").unwrap(), "");
        assert_eq!(normalize_var_key("/").unwrap(), "");
    }

    #[test]
    fn test_normalize_var_key_rejects_traversal() {
        assert!(normalize_var_key("a/../b").is_err());
        assert!(normalize_var_key("./a").is_err());
        assert!(normalize_var_key("a\0b").is_err());
        assert!(normalize_var_key(&"x".repeat(MAX_PATH_LEN + 1)).is_err());
    }

    #[test]
    fn test_chunk_path() {
        assert_eq!(chunk_path("grp/v", "1.2"), "grp/v/1.2");
        assert_eq!(chunk_path("", "1.2"), "1.2");
    }
}
