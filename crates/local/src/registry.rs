//! In-memory service registry with TTL expiry.
//!
//! Nodes leaving the registry, by deregistration or by missing their TTL, are
//! reported to every installed [`NodeWatcher`]. Watchers run after the registry
//! lock is released.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use svcmesh_core::{Node, NodeWatcher, RegistryError, Service};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct Registration {
    node: Node,
    expires_at: Instant,
}

#[derive(Default)]
struct Entry {
    version: String,
    registrations: Vec<Registration>,
}

/// Registry kept in process memory
#[derive(Default)]
pub struct MemoryRegistry {
    services: RwLock<HashMap<String, Entry>>,
    watchers: RwLock<Vec<NodeWatcher>>,
}

impl MemoryRegistry {
    /// Creates an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `node` under `service`, or renews it when already present
    pub fn register(&self, service: &str, node: Node, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        let mut services = self.services.write();
        let entry = services.entry(service.to_string()).or_default();
        match entry
            .registrations
            .iter_mut()
            .find(|r| r.node.id == node.id)
        {
            Some(existing) => {
                existing.node = node;
                existing.expires_at = expires_at;
            }
            None => {
                info!(service, node_id = %node.id, address = %node.address, "node registered");
                entry.registrations.push(Registration { node, expires_at });
            }
        }
    }

    /// Sets the version reported for `service`
    pub fn set_version(&self, service: &str, version: impl Into<String>) {
        let mut services = self.services.write();
        services.entry(service.to_string()).or_default().version = version.into();
    }

    /// Removes a node; returns false when it was not registered
    pub fn deregister(&self, service: &str, id: &str) -> bool {
        let removed = {
            let mut services = self.services.write();
            let Some(entry) = services.get_mut(service) else {
                return false;
            };
            let position = entry.registrations.iter().position(|r| r.node.id == id);
            let removed = position.map(|index| entry.registrations.remove(index).node);
            if entry.registrations.is_empty() {
                services.remove(service);
            }
            removed
        };

        match removed {
            Some(node) => {
                info!(service, node_id = %node.id, "node deregistered");
                self.notify(&[node]);
                true
            }
            None => false,
        }
    }

    /// Drops every node whose TTL has passed; returns how many were dropped
    pub fn expire(&self) -> usize {
        let now = Instant::now();
        let expired = {
            let mut services = self.services.write();
            let mut expired = Vec::new();
            for entry in services.values_mut() {
                let (gone, live): (Vec<_>, Vec<_>) = std::mem::take(&mut entry.registrations)
                    .into_iter()
                    .partition(|r| r.expires_at <= now);
                entry.registrations = live;
                expired.extend(gone.into_iter().map(|r| r.node));
            }
            services.retain(|_, entry| !entry.registrations.is_empty());
            expired
        };

        for node in &expired {
            info!(node_id = %node.id, "node expired");
        }
        self.notify(&expired);
        expired.len()
    }

    /// Current snapshot of `service`
    pub fn get_service(&self, service: &str) -> Result<Vec<Service>, RegistryError> {
        let services = self.services.read();
        let entry = services
            .get(service)
            .ok_or_else(|| RegistryError::NotFound(service.to_string()))?;
        let mut snapshot = Service::new(
            service,
            entry.registrations.iter().map(|r| r.node.clone()).collect(),
        );
        snapshot.version = entry.version.clone();
        Ok(vec![snapshot])
    }

    /// Names of every registered service
    pub fn list_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Installs a departure watcher
    pub fn watch(&self, watcher: NodeWatcher) {
        self.watchers.write().push(watcher);
    }

    /// Runs [`Self::expire`] every `period` until `token` is cancelled
    pub fn spawn_reaper(
        self: &Arc<Self>,
        period: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let expired = registry.expire();
                        if expired > 0 {
                            debug!(expired, "registry sweep");
                        }
                    }
                }
            }
        })
    }

    fn notify(&self, nodes: &[Node]) {
        if nodes.is_empty() {
            return;
        }
        let watchers = self.watchers.read().clone();
        for node in nodes {
            for watcher in &watchers {
                watcher(node);
            }
        }
    }
}
