//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read configuration file {}: {source}", .path.display())]
    Read {
        /// File that was attempted
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be written
    #[error("failed to write configuration file {}: {source}", .path.display())]
    Write {
        /// File that was attempted
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML
    #[error("failed to parse TOML configuration {}: {source}", .path.display())]
    Toml {
        /// File that was parsed
        path: PathBuf,
        /// Parser error
        #[source]
        source: toml::de::Error,
    },

    /// The configuration file is not valid JSON
    #[error("failed to parse JSON configuration {}: {source}", .path.display())]
    Json {
        /// File that was parsed
        path: PathBuf,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },

    /// The configuration parsed but violates a constraint
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
