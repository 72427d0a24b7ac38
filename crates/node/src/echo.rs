//! Echo module served over the loopback transport.
//!
//! Registers itself as `Echo@<instance>`, answers `echo` with its arguments
//! and `whoami` with its node id, and keeps its registration alive with
//! periodic heartbeats.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use svcmesh_config::{ModuleSettings, ROUTE_SEPARATOR};
use svcmesh_core::{App, CoreResult, Module, Node};
use svcmesh_local::{handler, LoopbackTransport, MemoryRegistry};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const ECHO_MODULE_TYPE: &str = "Echo";

struct Registration {
    node: Node,
    interval: Duration,
    ttl: Duration,
}

pub struct EchoModule {
    registry: Arc<MemoryRegistry>,
    transport: Arc<LoopbackTransport>,
    registration: Mutex<Option<Registration>>,
}

impl EchoModule {
    pub fn new(registry: Arc<MemoryRegistry>, transport: Arc<LoopbackTransport>) -> Self {
        Self {
            registry,
            transport,
            registration: Mutex::new(None),
        }
    }

    fn heartbeat(&self) -> Option<Duration> {
        let registration = self.registration.lock();
        let registration = registration.as_ref()?;
        self.registry
            .register(ECHO_MODULE_TYPE, registration.node.clone(), registration.ttl);
        Some(registration.interval)
    }
}

#[async_trait]
impl Module for EchoModule {
    fn module_type(&self) -> &str {
        ECHO_MODULE_TYPE
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn on_init(&self, app: &Arc<App>, settings: &ModuleSettings) -> CoreResult<()> {
        let id = format!("{ECHO_MODULE_TYPE}{ROUTE_SEPARATOR}{}", settings.id);
        let address = settings.host.clone().unwrap_or_else(|| "loopback".to_string());
        let node = Node::new(id.clone(), address).with_metadata("process_id", app.process_id());

        let me = id.clone();
        self.transport.serve(
            id.clone(),
            handler(move |method, args| {
                let me = me.clone();
                async move {
                    match method.as_str() {
                        "echo" => Ok(Value::Array(args)),
                        "whoami" => Ok(json!(me)),
                        other => Err(format!("unknown method {other}")),
                    }
                }
            }),
        );

        let options = app.options();
        *self.registration.lock() = Some(Registration {
            node,
            interval: options.register_interval,
            ttl: options.register_ttl,
        });
        self.heartbeat();
        info!(node_id = %id, "echo module serving");
        Ok(())
    }

    async fn run(&self, close: CancellationToken) {
        let Some(period) = self.heartbeat() else {
            close.cancelled().await;
            return;
        };
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = close.cancelled() => break,
                _ = ticker.tick() => {
                    self.heartbeat();
                    debug!("echo heartbeat");
                }
            }
        }
    }

    async fn on_destroy(&self) -> CoreResult<()> {
        if let Some(registration) = self.registration.lock().take() {
            self.registry
                .deregister(ECHO_MODULE_TYPE, &registration.node.id);
            self.transport.unserve(&registration.node.id);
            info!(node_id = %registration.node.id, "echo module stopped");
        }
        Ok(())
    }
}
