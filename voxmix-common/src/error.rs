//! Common error types for voxmix

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration parsing and validation
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors produced while reading a mix/effects configuration document
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Structural JSON error: bad syntax, wrong value types, missing required keys
    #[error("Malformed configuration: {0}")]
    Malformed(String),

    /// Well-formed document whose values break a semantic rule
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Configuration file could not be read
    #[error("Failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Malformed(err.to_string())
    }
}
