//! Session contract: this process's handle to one remote node.
//!
//! The wire transport and call/response correlation live behind
//! [`ServerSession`]; the directory only creates, refreshes and releases
//! sessions.

use crate::error::CoreResult;
use crate::node::Node;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Outcome of a remote call: the result value, or the remote error string
pub type CallResult = Result<Value, String>;

/// Cancellation and deadline context threaded through a call
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    /// A context with no deadline that is never cancelled
    pub fn background() -> Self {
        Self::default()
    }

    /// A context expiring after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            ..Self::default()
        }
    }

    /// Sets an absolute deadline
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Binds the context to a cancellation token
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The absolute deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// The cancellation token
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the context was cancelled or its deadline passed
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.remaining() == Some(Duration::ZERO)
    }
}

/// Handle to one remote node
#[async_trait]
pub trait ServerSession: Send + Sync {
    /// The node this session currently targets
    fn node(&self) -> Node;

    /// Refreshes the node in place; in-flight calls are unaffected
    fn set_node(&self, node: Node);

    /// Calls `method` and waits for the response
    async fn call(&self, ctx: &CallContext, method: &str, args: Vec<Value>) -> CallResult;

    /// Sends `method` without waiting for a response
    async fn call_nr(&self, method: &str, args: Vec<Value>) -> CoreResult<()>;

    /// Releases the network resources; must tolerate repeated calls
    fn release(&self);
}

/// Creates sessions on directory misses.
///
/// The directory holds the lock of the map shard owning the node id while
/// `create` runs. A slow factory stalls every id on that shard, and a factory
/// that calls back into the same [`SessionDirectory`] deadlocks. Keep
/// `create` cheap and defer connection setup to the first call.
///
/// [`SessionDirectory`]: crate::directory::SessionDirectory
pub trait SessionFactory: Send + Sync {
    /// Builds a session for `node` of `service`
    fn create(&self, service: &str, node: Node) -> CoreResult<Arc<dyn ServerSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_context_never_done() {
        let ctx = CallContext::background();
        assert!(!ctx.is_done());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn test_cancelled_context_is_done() {
        let token = CancellationToken::new();
        let ctx = CallContext::background().with_cancel(token.clone());
        token.cancel();
        assert!(ctx.is_done());
    }

    #[test]
    fn test_expired_deadline_is_done() {
        let ctx = CallContext::background().deadline_at(Instant::now());
        assert!(ctx.is_done());
    }
}
