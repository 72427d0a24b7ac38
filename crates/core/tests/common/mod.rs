//! Hand-written collaborators shared by the core integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use svcmesh_core::{
    CallContext, CallResult, CoreError, CoreResult, Next, Node, NodeWatcher, RegistryError,
    SelectOptions, Selector, ServerSession, Service, SessionFactory,
};

/// Selector over an editable in-memory snapshot.
///
/// Without a strategy override every pick returns the node at `pick`.
#[derive(Default)]
pub struct FakeSelector {
    services: RwLock<HashMap<String, Vec<Node>>>,
    watcher: Mutex<Option<NodeWatcher>>,
    pick: AtomicUsize,
    pub select_calls: AtomicUsize,
    pub get_service_calls: AtomicUsize,
}

impl FakeSelector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, service: &str, node: Node) {
        let mut services = self.services.write();
        let nodes = services.entry(service.to_string()).or_default();
        nodes.retain(|n| n.id != node.id);
        nodes.push(node);
    }

    /// Removes a node and notifies the watcher, like a deregistration
    pub fn remove(&self, service: &str, id: &str) {
        let removed = {
            let mut services = self.services.write();
            let nodes = services.entry(service.to_string()).or_default();
            let removed = nodes.iter().find(|n| n.id == id).cloned();
            nodes.retain(|n| n.id != id);
            removed
        };
        if let Some(node) = removed {
            self.notify(&node);
        }
    }

    pub fn notify(&self, node: &Node) {
        let watcher = self.watcher.lock().clone();
        if let Some(watcher) = watcher {
            watcher(node);
        }
    }

    pub fn set_pick(&self, index: usize) {
        self.pick.store(index, Ordering::SeqCst);
    }

    pub fn has_watcher(&self) -> bool {
        self.watcher.lock().is_some()
    }

    fn snapshot(&self, service: &str) -> Result<Vec<Service>, RegistryError> {
        self.services
            .read()
            .get(service)
            .map(|nodes| vec![Service::new(service, nodes.clone())])
            .ok_or_else(|| RegistryError::NotFound(service.to_string()))
    }
}

impl Selector for FakeSelector {
    fn select(&self, service: &str, options: &SelectOptions) -> Result<Next, RegistryError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        let services = options.apply_filters(self.snapshot(service)?);
        if let Some(strategy) = &options.strategy {
            return Ok(strategy(services));
        }

        let nodes: Vec<Node> = services.into_iter().flat_map(|s| s.nodes).collect();
        let pick = self.pick.load(Ordering::SeqCst);
        let name = service.to_string();
        Ok(Box::new(move || {
            if nodes.is_empty() {
                return Err(RegistryError::NoneAvailable(name.clone()));
            }
            Ok(nodes[pick % nodes.len()].clone())
        }))
    }

    fn get_service(&self, service: &str) -> Result<Vec<Service>, RegistryError> {
        self.get_service_calls.fetch_add(1, Ordering::SeqCst);
        self.snapshot(service)
    }

    fn set_watcher(&self, watcher: NodeWatcher) {
        *self.watcher.lock() = Some(watcher);
    }
}

/// Session that records calls and answers with the node id it targets
pub struct RecordingSession {
    node: RwLock<Node>,
    released: AtomicBool,
    pub release_count: AtomicUsize,
    pub calls: AtomicUsize,
}

impl RecordingSession {
    pub fn new(node: Node) -> Self {
        Self {
            node: RwLock::new(node),
            released: AtomicBool::new(false),
            release_count: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerSession for RecordingSession {
    fn node(&self) -> Node {
        self.node.read().clone()
    }

    fn set_node(&self, node: Node) {
        *self.node.write() = node;
    }

    async fn call(&self, ctx: &CallContext, method: &str, args: Vec<Value>) -> CallResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.is_released() {
            return Err("session released".to_string());
        }
        if ctx.is_done() {
            return Err("deadline exceeded".to_string());
        }
        Ok(json!({ "node": self.node().id, "method": method, "args": args }))
    }

    async fn call_nr(&self, _method: &str, _args: Vec<Value>) -> CoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.is_released() {
            return Err(CoreError::Session("session released".to_string()));
        }
        Ok(())
    }

    fn release(&self) {
        self.release_count.fetch_add(1, Ordering::SeqCst);
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Factory keeping every session it creates
#[derive(Default)]
pub struct RecordingFactory {
    delay: Option<Duration>,
    pub created: Mutex<Vec<Arc<RecordingSession>>>,
}

impl RecordingFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A factory that sleeps inside `create`, widening creation races
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn released_count(&self) -> usize {
        self.created
            .lock()
            .iter()
            .filter(|session| session.is_released())
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.created
            .lock()
            .iter()
            .map(|session| session.calls.load(Ordering::SeqCst))
            .sum()
    }
}

impl SessionFactory for RecordingFactory {
    fn create(&self, _service: &str, node: Node) -> CoreResult<Arc<dyn ServerSession>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let session = Arc::new(RecordingSession::new(node));
        self.created.lock().push(Arc::clone(&session));
        Ok(session)
    }
}

pub fn node(id: &str) -> Node {
    Node::new(id, format!("127.0.0.1:{}", 4000 + id.len()))
}
