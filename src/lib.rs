//! # svcmesh: session directory and lifecycle runtime for application nodes
//!
//! A node hosts modules, finds remote modules through a registry-backed
//! selector, keeps one session per remote node, and shuts down within a
//! bounded drain deadline.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use svcmesh::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = MemoryRegistry::new();
//!     let transport = LoopbackTransport::new();
//!     let app = App::builder(
//!         AppOptions::default(),
//!         Arc::new(RegistrySelector::new(registry)),
//!         Arc::new(LoopbackFactory::new(transport)),
//!     )
//!     .build();
//!
//!     app.run(Vec::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`config`] - application options and the persisted settings file
//! - [`core`] - session directory, router, dispatch, envelopes, modules and
//!   the application lifecycle
//! - [`local`] - in-process registry, selector and loopback transport

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub use svcmesh_config as config;
pub use svcmesh_core as core;
pub use svcmesh_local as local;

/// Common imports for svcmesh applications
pub mod prelude {
    pub use crate::config::{AppOptions, ModuleSettings, Settings};
    pub use crate::core::{
        App, AppState, CallContext, CoreError, CoreResult, Module, Node, ProtocolMarshal,
        RouteTarget, SelectOptions, Selector, ServerSession, SessionDirectory, SessionFactory,
        Signal,
    };
    pub use crate::local::{
        LoopbackFactory, LoopbackTransport, MemoryRegistry, RegistrySelector,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
