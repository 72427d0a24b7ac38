//! Code-level application options.
//!
//! These are chosen by the program embedding the runtime (or by CLI flags in
//! the node binary) and are never read from the settings file.

use crate::{
    DEFAULT_KILL_WAIT_TTL, DEFAULT_PROCESS_ID, DEFAULT_REGISTER_INTERVAL, DEFAULT_REGISTER_TTL,
    DEFAULT_RPC_EXPIRED,
};
use std::path::PathBuf;
use std::time::Duration;

/// Application options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppOptions {
    /// Application version reported in lifecycle logs
    pub version: String,
    /// Process group id; selects which configured module instances run here
    pub process_id: String,
    /// Path of the persisted settings file
    pub conf_path: Option<PathBuf>,
    /// Directory or file receiving log output; `None` logs to the console only
    pub log_dir: Option<PathBuf>,
    /// Debug mode: log records are also written to the console
    pub debug: bool,
    /// Interval between registry heartbeats
    pub register_interval: Duration,
    /// TTL of a registry entry
    pub register_ttl: Duration,
    /// Maximum drain duration on shutdown
    pub kill_wait_ttl: Duration,
    /// Remote call expiry
    pub rpc_expired: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            process_id: DEFAULT_PROCESS_ID.to_string(),
            conf_path: None,
            log_dir: None,
            debug: true,
            register_interval: DEFAULT_REGISTER_INTERVAL,
            register_ttl: DEFAULT_REGISTER_TTL,
            kill_wait_ttl: DEFAULT_KILL_WAIT_TTL,
            rpc_expired: DEFAULT_RPC_EXPIRED,
        }
    }
}

impl AppOptions {
    /// Sets the settings file path
    pub fn with_conf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.conf_path = Some(path.into());
        self
    }

    /// Sets the process group id
    pub fn with_process_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = process_id.into();
        self
    }

    /// Sets the application version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the maximum drain duration
    pub fn with_kill_wait_ttl(mut self, ttl: Duration) -> Self {
        self.kill_wait_ttl = ttl;
        self
    }

    /// Sets the remote call expiry
    pub fn with_rpc_expired(mut self, expired: Duration) -> Self {
        self.rpc_expired = expired;
        self
    }

    /// Sets the registry heartbeat interval and entry TTL
    pub fn with_registration(mut self, interval: Duration, ttl: Duration) -> Self {
        self.register_interval = interval;
        self.register_ttl = ttl;
        self
    }

    /// Sets the log directory
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Sets debug mode
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
