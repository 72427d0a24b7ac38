//! # svcmesh Local
//!
//! In-process collaborators for single-process deployments and tests: a TTL
//! registry, a selector over it, and loopback sessions that hand calls to
//! handlers registered in the same process.

pub mod loopback;
pub mod registry;
pub mod selector;

pub use loopback::{handler, Handler, LoopbackFactory, LoopbackSession, LoopbackTransport};
pub use registry::MemoryRegistry;
pub use selector::RegistrySelector;
