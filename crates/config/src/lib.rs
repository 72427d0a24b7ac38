//! svcmesh Configuration Module
//!
//! This module provides the option and settings types consumed by the
//! application lifecycle: code-level [`AppOptions`] chosen by the embedding
//! program, and the persisted [`Settings`] file loaded at startup.

mod error;
mod options;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use options::AppOptions;
pub use settings::{ModuleSettings, NetworkSettings, RpcSettings, Settings};

use std::time::Duration;

/// Default process group id used when none is configured
pub const DEFAULT_PROCESS_ID: &str = "development";

/// Interval between registry heartbeats
pub const DEFAULT_REGISTER_INTERVAL: Duration = Duration::from_secs(10);

/// TTL of a registry entry
pub const DEFAULT_REGISTER_TTL: Duration = Duration::from_secs(20);

/// Maximum time the shutdown drain may take before the process aborts
pub const DEFAULT_KILL_WAIT_TTL: Duration = Duration::from_secs(60);

/// Default remote call expiry
pub const DEFAULT_RPC_EXPIRED: Duration = Duration::from_secs(10);

/// Routing expression separator between service type and node id
pub const ROUTE_SEPARATOR: char = '@';
