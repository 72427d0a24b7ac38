//! Loopback transport: sessions whose calls are served by handlers in the
//! same process.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use svcmesh_config::DEFAULT_RPC_EXPIRED;
use svcmesh_core::{
    CallContext, CallResult, CoreError, CoreResult, Node, ServerSession, SessionFactory,
};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Serves calls addressed to one node: `(method, args) -> result`
pub type Handler = Arc<dyn Fn(String, Vec<Value>) -> BoxFuture<'static, CallResult> + Send + Sync>;

/// Wraps an async closure as a [`Handler`]
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(String, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallResult> + Send + 'static,
{
    Arc::new(move |method, args| Box::pin(f(method, args)))
}

/// Routes calls to handlers keyed by node id
#[derive(Default)]
pub struct LoopbackTransport {
    handlers: DashMap<String, Handler>,
    delivered: AtomicU64,
}

impl LoopbackTransport {
    /// Creates a transport without handlers
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serves calls for `node_id`, replacing any previous handler
    pub fn serve(&self, node_id: impl Into<String>, handler: Handler) {
        self.handlers.insert(node_id.into(), handler);
    }

    /// Stops serving `node_id`
    pub fn unserve(&self, node_id: &str) -> bool {
        self.handlers.remove(node_id).is_some()
    }

    /// Number of calls handed to a handler
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Hands a call to the handler of `node_id`
    pub async fn deliver(&self, node_id: &str, method: &str, args: Vec<Value>) -> CallResult {
        let handler = self
            .handlers
            .get(node_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| format!("no handler for node {node_id}"))?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        trace!(node_id, method, "loopback delivery");
        handler(method.to_string(), args).await
    }
}

/// Session over a [`LoopbackTransport`]
pub struct LoopbackSession {
    service: String,
    node: RwLock<Node>,
    transport: Arc<LoopbackTransport>,
    expired: Duration,
    released: AtomicBool,
}

impl LoopbackSession {
    /// Creates a session targeting `node`; calls expire after `expired`
    pub fn new(
        service: impl Into<String>,
        node: Node,
        transport: Arc<LoopbackTransport>,
        expired: Duration,
    ) -> Self {
        Self {
            service: service.into(),
            node: RwLock::new(node),
            transport,
            expired,
            released: AtomicBool::new(false),
        }
    }

    /// Service this session belongs to
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Whether [`ServerSession::release`] was called
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn node_id(&self) -> String {
        self.node.read().id.clone()
    }
}

#[async_trait]
impl ServerSession for LoopbackSession {
    fn node(&self) -> Node {
        self.node.read().clone()
    }

    fn set_node(&self, node: Node) {
        *self.node.write() = node;
    }

    async fn call(&self, ctx: &CallContext, method: &str, args: Vec<Value>) -> CallResult {
        let node_id = self.node_id();
        if self.is_released() {
            return Err(format!("session released: {node_id}"));
        }

        let limit = ctx
            .remaining()
            .map_or(self.expired, |remaining| remaining.min(self.expired));
        tokio::select! {
            _ = ctx.cancel_token().cancelled() => Err("context canceled".to_string()),
            outcome = timeout(limit, self.transport.deliver(&node_id, method, args)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(node_id = %node_id, method, "call deadline exceeded");
                        Err("deadline exceeded".to_string())
                    }
                }
            }
        }
    }

    async fn call_nr(&self, method: &str, args: Vec<Value>) -> CoreResult<()> {
        let node_id = self.node_id();
        if self.is_released() {
            return Err(CoreError::Session(format!("session released: {node_id}")));
        }

        let transport = Arc::clone(&self.transport);
        let method = method.to_string();
        tokio::spawn(async move {
            if let Err(e) = transport.deliver(&node_id, &method, args).await {
                warn!(node_id = %node_id, method = %method, error = %e, "notification failed");
            }
        });
        Ok(())
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            debug!(service = %self.service, node_id = %self.node_id(), "loopback session released");
        }
    }
}

/// Creates [`LoopbackSession`]s over one transport
pub struct LoopbackFactory {
    transport: Arc<LoopbackTransport>,
    rpc_expired: Duration,
}

impl LoopbackFactory {
    /// Creates a factory with the default call expiry
    pub fn new(transport: Arc<LoopbackTransport>) -> Self {
        Self {
            transport,
            rpc_expired: DEFAULT_RPC_EXPIRED,
        }
    }

    /// Overrides the call expiry
    pub fn with_rpc_expired(mut self, rpc_expired: Duration) -> Self {
        self.rpc_expired = rpc_expired;
        self
    }
}

impl SessionFactory for LoopbackFactory {
    fn create(&self, service: &str, node: Node) -> CoreResult<Arc<dyn ServerSession>> {
        Ok(Arc::new(LoopbackSession::new(
            service,
            node,
            Arc::clone(&self.transport),
            self.rpc_expired,
        )))
    }
}
