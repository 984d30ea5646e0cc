//! Configuration for the chunk cache and its background pool.
//!
//! Settings are plain serde structs loaded from TOML. Every field has a
//! default so a partial file, or none at all, is valid.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

fn default_min_threads() -> usize {
    0
}

fn default_max_threads() -> usize {
    4
}

fn default_keep_alive_ms() -> u64 {
    60_000
}

fn default_thread_name() -> String {
    "region-cache".to_string()
}

fn default_hot_column() -> bool {
    true
}

fn default_rebuild_batch_size() -> usize {
    64
}

/// Chunk cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Workers kept alive while the pool is idle
    #[serde(default = "default_min_threads")]
    pub min_threads: usize,
    /// Upper bound on concurrently running enumeration workers
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// Idle time in milliseconds before a worker above `min_threads` exits
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,
    /// Worker thread name prefix, workers are named `<prefix>-<n>`
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Whether consecutive queries in one column skip the map lookup
    #[serde(default = "default_hot_column")]
    pub hot_column: bool,
    /// Columns per background task when many are scheduled at once
    #[serde(default = "default_rebuild_batch_size")]
    pub rebuild_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_threads: default_min_threads(),
            max_threads: default_max_threads(),
            keep_alive_ms: default_keep_alive_ms(),
            thread_name: default_thread_name(),
            hot_column: default_hot_column(),
            rebuild_batch_size: default_rebuild_batch_size(),
        }
    }
}

impl CacheConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    /// Checks the settings for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.min_threads > self.max_threads {
            return Err(ConfigError::ThreadBounds {
                min: self.min_threads,
                max: self.max_threads,
            });
        }
        if self.rebuild_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.thread_name.trim().is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to it and
    /// returns the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
            Self::from_toml_str(&content)
        } else {
            let config = CacheConfig::default();
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(path, content).map_err(|e| ConfigError::FileWrite(path.to_path_buf(), e))?;
            info!("Created default cache configuration file: {}", path.display());
            Ok(config)
        }
    }
}
