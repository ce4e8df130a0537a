//! Configuration system for zcache
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/zcache/config.toml
//! - Linux: ~/.config/zcache/config.toml
//! - Windows: %APPDATA%/zcache/config.toml

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{CacheSettings, DimensionSeparator};
use crate::{DEFAULT_CHUNK_CACHE_NELEMS, DEFAULT_CHUNK_CACHE_PREEMPTION, DEFAULT_CHUNK_CACHE_SIZE};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chunk cache settings applied to every variable
    pub cache: CacheConfig,
    /// Backing store settings
    pub store: StoreConfig,
}

/// Chunk cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Per-variable cache budget in bytes (default 16MB)
    pub size_bytes: u64,
    /// Requested number of cache slots
    pub nelems: usize,
    /// Preemption hint, must be within [0, 1]
    pub preemption: f32,
    /// Separator used when building chunk keys
    pub dimension_separator: DimensionSeparator,
    /// Fill value pattern for chunks absent from the store (zero-fill if unset)
    pub fill_value: Option<Vec<u8>>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size_bytes: DEFAULT_CHUNK_CACHE_SIZE,
            nelems: DEFAULT_CHUNK_CACHE_NELEMS,
            preemption: DEFAULT_CHUNK_CACHE_PREEMPTION,
            dimension_separator: DimensionSeparator::Dot,
            fill_value: None,
        }
    }
}

impl CacheConfig {
    /// Validated cache settings
    pub fn settings(&self) -> Result<CacheSettings, ConfigError> {
        CacheSettings::new(self.size_bytes, self.nelems, self.preemption)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Backing store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the directory store (uses system data dir if None)
    pub root: Option<PathBuf>,
    /// Allow writes to the store
    pub writable: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: None,
            writable: true,
        }
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.settings()?;
        if let Some(fill) = &self.cache.fill_value {
            if fill.is_empty() {
                return Err(ConfigError::Invalid("fill_value must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "zcache", "zcache")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default store directory
    pub fn default_store_dir() -> Option<PathBuf> {
        ProjectDirs::from("org", "zcache", "zcache").map(|dirs| dirs.data_dir().join("store"))
    }

    /// Effective store root (config override or system default)
    pub fn store_root(&self) -> PathBuf {
        self.store
            .root
            .clone()
            .or_else(Self::default_store_dir)
            .unwrap_or_else(|| PathBuf::from("/tmp/zcache/store"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
