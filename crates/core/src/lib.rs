//! # svcmesh Core
//!
//! Session directory, routing and lifecycle orchestration for a node of a
//! distributed application.
//!
//! ## Features
//!
//! - **Session Directory**: node id to session cache, refreshed in place and
//!   evicted when the registry reports a node gone
//! - **Routing**: `type` expressions load-balance through a [`Selector`],
//!   `type@id` expressions pin one node
//! - **Dispatch**: synchronous, fire-and-forget and context-bound calls
//! - **Result Envelopes**: swappable encoding of RPC responses
//! - **Lifecycle**: module init in order, bounded-time drain on shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use svcmesh_core::{App, Selector, SessionFactory};
//! use svcmesh_config::AppOptions;
//!
//! # async fn start(
//! #     selector: Arc<dyn Selector>,
//! #     factory: Arc<dyn SessionFactory>,
//! # ) -> svcmesh_core::CoreResult<()> {
//! let app = App::builder(AppOptions::default(), selector, factory).build();
//! app.run(Vec::new()).await
//! # }
//! ```

pub mod app;
pub mod directory;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod module;
pub mod node;
pub mod router;
pub mod selector;
pub mod session;
pub mod signal;
pub mod timer;

pub use app::{App, AppBuilder, AppHook, AppState, LogHandle, ModuleInitedHook, RpcSerialize};
pub use directory::SessionDirectory;
pub use dispatch::Dispatcher;
pub use envelope::{EnvelopeBuilder, MarshalHook, ProtocolMarshal, ResultEnvelope};
pub use error::{CoreError, CoreResult};
pub use module::{Module, ModuleManager};
pub use node::{Node, Service};
pub use router::{MapRoute, RouteTarget, Router};
pub use selector::{
    Filter, Next, NodeWatcher, RegistryError, SelectOptions, Selector, Strategy,
};
pub use session::{CallContext, CallResult, ServerSession, SessionFactory};
pub use signal::{wait_for_signal, Signal};
pub use timer::{TimerId, TimerModule, TimingWheel, TIMER_MODULE_TYPE};

/// Core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
