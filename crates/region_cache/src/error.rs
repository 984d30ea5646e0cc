//! Error types for region construction and cache configuration
//!
//! The cache itself never fails: stale or missing columns fall back to the
//! authoritative store and cancelled background work is routine. Errors only
//! arise when building regions from untrusted input or loading configuration.

use std::{io::Error as IoError, path::PathBuf};
use thiserror::Error;

/// Region construction errors
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Invalid region id {0:?}: only letters, digits and _ , ' - + / are allowed")]
    InvalidId(String),

    #[error("Polygonal region {id} needs at least 3 points, got {count}")]
    TooFewPoints { id: String, count: usize },
}

/// Cache configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileRead(PathBuf, IoError),

    #[error("Failed to write config file {0}: {1}")]
    FileWrite(PathBuf, IoError),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("max_threads must be at least 1")]
    NoWorkers,

    #[error("min_threads ({min}) cannot exceed max_threads ({max})")]
    ThreadBounds { min: usize, max: usize },

    #[error("rebuild_batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("thread_name cannot be empty")]
    EmptyThreadName,
}
