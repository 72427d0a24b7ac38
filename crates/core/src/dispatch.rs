//! Dispatch façade: the three call shapes offered to application code.
//!
//! Every call resolves a session through the [`Router`] first. No retries
//! happen here; retry policy belongs to the session transport.

use crate::error::CoreResult;
use crate::router::Router;
use crate::selector::SelectOptions;
use crate::session::{CallContext, CallResult};
use serde_json::Value;
use tracing::debug;

/// Routes calls to remote modules
#[derive(Clone)]
pub struct Dispatcher {
    router: Router,
}

impl Dispatcher {
    /// Creates a dispatcher over a router
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// The router used for resolution
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Calls `method` on the module addressed by `route` and waits for the result.
    ///
    /// Resolution failures come back as the error string without touching the
    /// network.
    pub async fn invoke(&self, route: &str, method: &str, args: Vec<Value>) -> CallResult {
        let session = self
            .router
            .route(route, &SelectOptions::default())
            .map_err(|e| e.to_string())?;
        session.call(&CallContext::background(), method, args).await
    }

    /// Sends `method` to the module addressed by `route` without waiting for a
    /// response
    pub async fn invoke_nr(&self, route: &str, method: &str, args: Vec<Value>) -> CoreResult<()> {
        let session = self.router.route(route, &SelectOptions::default())?;
        session.call_nr(method, args).await
    }

    /// Calls `method` under `ctx`, letting `options` steer load balancing
    pub async fn call(
        &self,
        ctx: &CallContext,
        route: &str,
        method: &str,
        args: Vec<Value>,
        options: &SelectOptions,
    ) -> CallResult {
        let session = self.router.route(route, options).map_err(|e| {
            debug!(route, method, error = %e, "route resolution failed");
            e.to_string()
        })?;
        session.call(ctx, method, args).await
    }
}
