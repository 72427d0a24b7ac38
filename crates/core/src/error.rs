//! Core error types

use svcmesh_config::ConfigError;
use thiserror::Error;

/// Core runtime errors
#[derive(Debug, Error)]
pub enum CoreError {
    /// No node or session matches the request
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Result envelope could not be serialized
    #[error("envelope build failed: {0}")]
    Build(String),

    /// The shutdown drain exceeded its deadline
    #[error("close timeout: drain deadline exceeded (signal: {signal})")]
    ShutdownTimeout {
        /// Signal that triggered the shutdown
        signal: String,
    },

    /// The session failed to create or deliver a call
    #[error("session error: {0}")]
    Session(String),

    /// A module failed during init
    #[error("module {module} failed: {message}")]
    Module {
        /// Module type
        module: String,
        /// Failure description
        message: String,
    },

    /// A registry name is already taken
    #[error("The name({0}) has been occupied")]
    NameOccupied(String),

    /// An operation that requires an unstarted application was attempted later
    #[error("application already running")]
    AlreadyRunning,

    /// Installing the OS signal handler failed
    #[error("signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}

impl CoreError {
    /// Whether this error reports a missing node or session
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
