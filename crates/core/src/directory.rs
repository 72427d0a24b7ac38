//! Session Directory
//!
//! Concurrent cache mapping node id to session. Sessions are created lazily on
//! the first resolution of their node, refreshed in place on every later
//! resolution, and destroyed exactly once when the registry reports the node
//! gone.
//!
//! # Concurrency policy
//!
//! - Creation holds the map entry for the key while the factory runs, so two
//!   concurrent misses on the same id produce exactly one cached session.
//!   The shard lock is held across [`SessionFactory::create`], so the factory
//!   must not block for long or re-enter the directory.
//! - Eviction removes the entry first and releases the session afterwards. The
//!   cache therefore never holds a released session; a caller that resolved
//!   the session before the eviction may still hold it for the remainder of
//!   its call, which fails at the transport.
//! - A resolution working from a selector snapshot taken before an eviction can
//!   re-create a session for the departed node. That entry is dropped on the
//!   node's next deregistration or by [`SessionDirectory::release_all`]; the
//!   window is accepted rather than guarded with tombstones.
//! - The id fallback in [`SessionDirectory::resolve_by_id`] scans a snapshot
//!   fetched after the cache miss, not atomically with it.

use crate::error::{CoreError, CoreResult};
use crate::node::Node;
use crate::selector::{NodeWatcher, SelectOptions, Selector};
use crate::session::{ServerSession, SessionFactory};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use svcmesh_config::ROUTE_SEPARATOR;
use tracing::{debug, info, warn};

/// Node id to session cache
pub struct SessionDirectory {
    selector: Arc<dyn Selector>,
    factory: Arc<dyn SessionFactory>,
    sessions: DashMap<String, Arc<dyn ServerSession>>,
}

impl SessionDirectory {
    /// Creates an empty directory over a selector and session factory
    pub fn new(selector: Arc<dyn Selector>, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            selector,
            factory,
            sessions: DashMap::new(),
        }
    }

    /// The selector this directory resolves through
    pub fn selector(&self) -> &Arc<dyn Selector> {
        &self.selector
    }

    /// Returns a session for every live node of `service`.
    ///
    /// An unknown service or a failing selector yields an empty list.
    pub fn resolve_by_type(&self, service: &str) -> Vec<Arc<dyn ServerSession>> {
        let services = match self.selector.get_service(service) {
            Ok(services) => services,
            Err(e) => {
                debug!(service, error = %e, "no instances for service");
                return Vec::new();
            }
        };

        let mut sessions = Vec::new();
        for node in services.into_iter().flat_map(|s| s.nodes) {
            let node_id = node.id.clone();
            match self.materialize(service, node) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(service, node_id = %node_id, error = %e, "session creation failed"),
            }
        }
        sessions
    }

    /// Returns the session of one load-balanced node of `service`
    pub fn resolve_one(
        &self,
        service: &str,
        options: &SelectOptions,
    ) -> CoreResult<Arc<dyn ServerSession>> {
        let mut next = self
            .selector
            .select(service, options)
            .map_err(|e| CoreError::NotFound(format!("{service}: {e}")))?;
        let node = next().map_err(|e| CoreError::NotFound(format!("{service}: {e}")))?;
        self.materialize(service, node)
    }

    /// Returns the session of the node with id `id` (`type@instance`).
    ///
    /// A cache miss falls back to [`Self::resolve_by_type`] on the type part
    /// and scans the result for a matching id.
    pub fn resolve_by_id(&self, id: &str) -> CoreResult<Arc<dyn ServerSession>> {
        if let Some(session) = self.get(id) {
            return Ok(session);
        }

        let parts: Vec<&str> = id.split(ROUTE_SEPARATOR).collect();
        if parts.len() != 2 {
            return Err(CoreError::NotFound(format!("invalid server id {id}")));
        }

        self.resolve_by_type(parts[0])
            .into_iter()
            .find(|session| session.node().id == id)
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    /// Drops and releases the session of a node that left the registry.
    ///
    /// Idempotent per node id.
    pub fn evict(&self, node: &Node) {
        if let Some((_, session)) = self.sessions.remove(&node.id) {
            session.release();
            info!(node_id = %node.id, "session evicted");
        }
    }

    /// A watcher that evicts departed nodes from this directory.
    ///
    /// Holds a weak reference so the selector does not keep the directory alive.
    pub fn eviction_watcher(self: &Arc<Self>) -> NodeWatcher {
        let directory: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |node: &Node| {
            if let Some(directory) = directory.upgrade() {
                directory.evict(node);
            }
        })
    }

    /// Cache-only lookup
    pub fn get(&self, id: &str) -> Option<Arc<dyn ServerSession>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether a session for `id` is cached
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of cached sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of every cached session
    pub fn snapshot(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Releases and drops every cached session
    pub fn release_all(&self) {
        for id in self.snapshot() {
            if let Some((_, session)) = self.sessions.remove(&id) {
                session.release();
            }
        }
        debug!("all sessions released");
    }

    /// Returns the cached session for `node` after refreshing its node, or
    /// creates and caches one. The entry stays locked for the whole step.
    fn materialize(&self, service: &str, node: Node) -> CoreResult<Arc<dyn ServerSession>> {
        match self.sessions.entry(node.id.clone()) {
            Entry::Occupied(entry) => {
                let session = Arc::clone(entry.get());
                session.set_node(node);
                Ok(session)
            }
            Entry::Vacant(entry) => {
                let node_id = node.id.clone();
                let session = self.factory.create(service, node)?;
                entry.insert(Arc::clone(&session));
                debug!(service, node_id = %node_id, "session created");
                Ok(session)
            }
        }
    }
}
