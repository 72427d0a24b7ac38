//! Application object and lifecycle orchestration.
//!
//! An [`App`] walks `Unstarted -> ConfigLoaded -> ModulesRegistered -> Running
//! -> Draining -> Stopped`. Draining races module teardown against the
//! configured kill-wait deadline; losing that race is reported as
//! [`CoreError::ShutdownTimeout`] and the caller is expected to abort.

use crate::directory::SessionDirectory;
use crate::dispatch::Dispatcher;
use crate::envelope::{EnvelopeBuilder, MarshalHook, ProtocolMarshal};
use erased_serde::Serialize as ErasedSerialize;
use crate::error::{CoreError, CoreResult};
use crate::module::{Module, ModuleManager};
use crate::router::{MapRoute, Router};
use crate::selector::{SelectOptions, Selector};
use crate::session::{CallContext, CallResult, ServerSession, SessionFactory};
use crate::signal::{wait_for_signal, Signal};
use crate::timer::{TimerModule, TimingWheel};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use svcmesh_config::{AppOptions, Settings};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Lifecycle states of an [`App`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AppState {
    /// Built, not yet run
    Unstarted,
    /// Settings loaded
    ConfigLoaded,
    /// Modules handed to the manager
    ModulesRegistered,
    /// Every module initialised; waiting for a signal
    Running,
    /// Tearing down after a signal
    Draining,
    /// Teardown finished
    Stopped,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppState::Unstarted => "unstarted",
            AppState::ConfigLoaded => "config-loaded",
            AppState::ModulesRegistered => "modules-registered",
            AppState::Running => "running",
            AppState::Draining => "draining",
            AppState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Log sink controls used around shutdown
pub trait LogHandle: Send + Sync {
    /// Flushes buffered records
    fn flush(&self);

    /// Flushes and closes the sink
    fn close(&self);
}

/// Named payload codec registered with an [`App`]
pub trait RpcSerialize: Send + Sync {
    /// Encodes a value, returning its type tag and bytes
    fn serialize(&self, value: &Value) -> Result<(String, Vec<u8>), String>;

    /// Decodes bytes carrying `type_tag`
    fn deserialize(&self, type_tag: &str, data: &[u8]) -> Result<Value, String>;
}

/// Hook receiving the application
pub type AppHook = Arc<dyn Fn(&App) + Send + Sync>;

/// Hook receiving the application and a freshly initialised module
pub type ModuleInitedHook = Arc<dyn Fn(&App, &dyn Module) + Send + Sync>;

#[derive(Default, Clone)]
struct Hooks {
    configuration_loaded: Option<AppHook>,
    module_inited: Option<ModuleInitedHook>,
    startup: Option<AppHook>,
}

/// Builds an [`App`]; hooks are fixed once [`AppBuilder::build`] returns
pub struct AppBuilder {
    options: AppOptions,
    settings: Settings,
    selector: Arc<dyn Selector>,
    factory: Arc<dyn SessionFactory>,
    hooks: Hooks,
    map_route: Option<MapRoute>,
    protocol_marshal: Option<MarshalHook>,
    log_handle: Option<Arc<dyn LogHandle>>,
    wheel: Option<Arc<TimingWheel>>,
}

impl AppBuilder {
    /// Settings used when `options.conf_path` is unset
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Called after the settings file is loaded
    pub fn on_configuration_loaded<F>(mut self, hook: F) -> Self
    where
        F: Fn(&App) + Send + Sync + 'static,
    {
        self.hooks.configuration_loaded = Some(Arc::new(hook));
        self
    }

    /// Called after each module finishes its init
    pub fn on_module_inited<F>(mut self, hook: F) -> Self
    where
        F: Fn(&App, &dyn Module) + Send + Sync + 'static,
    {
        self.hooks.module_inited = Some(Arc::new(hook));
        self
    }

    /// Called once every module is running
    pub fn on_startup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&App) + Send + Sync + 'static,
    {
        self.hooks.startup = Some(Arc::new(hook));
        self
    }

    /// Rewrites every routing expression before resolution
    pub fn map_route<F>(mut self, map_route: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.map_route = Some(Arc::new(map_route));
        self
    }

    /// Replaces the default result envelope encoding
    pub fn protocol_marshal<F>(mut self, marshal: F) -> Self
    where
        F: Fn(&str, &dyn ErasedSerialize, &str) -> Result<ProtocolMarshal, String>
            + Send
            + Sync
            + 'static,
    {
        self.protocol_marshal = Some(Arc::new(marshal));
        self
    }

    /// Log sink flushed on signal and closed after a clean shutdown
    pub fn log_handle(mut self, handle: Arc<dyn LogHandle>) -> Self {
        self.log_handle = Some(handle);
        self
    }

    /// Timing wheel driven by the internal timer module
    pub fn timing_wheel(mut self, wheel: Arc<TimingWheel>) -> Self {
        self.wheel = Some(wheel);
        self
    }

    /// Wires the directory into the selector's deregistration watch and
    /// returns the application
    pub fn build(self) -> Arc<App> {
        let directory = Arc::new(SessionDirectory::new(
            Arc::clone(&self.selector),
            self.factory,
        ));
        self.selector.set_watcher(directory.eviction_watcher());

        let mut router = Router::new(Arc::clone(&directory));
        if let Some(map_route) = self.map_route {
            router = router.with_map_route(map_route);
        }
        let envelopes = match self.protocol_marshal {
            Some(hook) => EnvelopeBuilder::with_hook(hook),
            None => EnvelopeBuilder::new(),
        };

        Arc::new(App {
            options: self.options,
            settings: RwLock::new(Arc::new(self.settings)),
            state: RwLock::new(AppState::Unstarted),
            started: AtomicBool::new(false),
            directory,
            dispatcher: Dispatcher::new(router),
            envelopes,
            hooks: self.hooks,
            rpc_serializes: RwLock::new(BTreeMap::new()),
            log_handle: self.log_handle,
            wheel: self.wheel.unwrap_or_default(),
        })
    }
}

/// A node of the distributed application
pub struct App {
    options: AppOptions,
    settings: RwLock<Arc<Settings>>,
    state: RwLock<AppState>,
    started: AtomicBool,
    directory: Arc<SessionDirectory>,
    dispatcher: Dispatcher,
    envelopes: EnvelopeBuilder,
    hooks: Hooks,
    rpc_serializes: RwLock<BTreeMap<String, Arc<dyn RpcSerialize>>>,
    log_handle: Option<Arc<dyn LogHandle>>,
    wheel: Arc<TimingWheel>,
}

impl App {
    /// Starts building an application over a selector and session factory
    pub fn builder(
        options: AppOptions,
        selector: Arc<dyn Selector>,
        factory: Arc<dyn SessionFactory>,
    ) -> AppBuilder {
        AppBuilder {
            options,
            settings: Settings::default(),
            selector,
            factory,
            hooks: Hooks::default(),
            map_route: None,
            protocol_marshal: None,
            log_handle: None,
            wheel: None,
        }
    }

    /// Application options
    pub fn options(&self) -> &AppOptions {
        &self.options
    }

    /// Current settings
    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings.read())
    }

    /// Process group id
    pub fn process_id(&self) -> &str {
        &self.options.process_id
    }

    /// Application version
    pub fn version(&self) -> &str {
        &self.options.version
    }

    /// Lifecycle state
    pub fn state(&self) -> AppState {
        *self.state.read()
    }

    /// Session directory
    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    /// Router over the session directory
    pub fn router(&self) -> &Router {
        self.dispatcher.router()
    }

    /// Dispatch façade
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Timing wheel ticked by the internal timer module
    pub fn timer(&self) -> &Arc<TimingWheel> {
        &self.wheel
    }

    /// Registers a named payload codec; only allowed before [`Self::run`]
    pub fn add_rpc_serialize(
        &self,
        name: &str,
        serialize: Arc<dyn RpcSerialize>,
    ) -> CoreResult<()> {
        if self.started.load(Ordering::SeqCst) {
            return Err(CoreError::AlreadyRunning);
        }
        let mut serializes = self.rpc_serializes.write();
        if serializes.contains_key(name) {
            return Err(CoreError::NameOccupied(name.to_string()));
        }
        serializes.insert(name.to_string(), serialize);
        Ok(())
    }

    /// Names of the registered payload codecs
    pub fn rpc_serializes(&self) -> Vec<String> {
        self.rpc_serializes.read().keys().cloned().collect()
    }

    /// Looks up a payload codec by name
    pub fn rpc_serialize(&self, name: &str) -> Option<Arc<dyn RpcSerialize>> {
        self.rpc_serializes.read().get(name).cloned()
    }

    /// Session of the node with id `id`
    pub fn get_server_by_id(&self, id: &str) -> CoreResult<Arc<dyn ServerSession>> {
        self.directory.resolve_by_id(id)
    }

    /// Sessions of every node of `service`
    pub fn get_servers_by_type(&self, service: &str) -> Vec<Arc<dyn ServerSession>> {
        self.directory.resolve_by_type(service)
    }

    /// Session of one load-balanced node of `service`
    pub fn get_server_by_selector(
        &self,
        service: &str,
        options: &SelectOptions,
    ) -> CoreResult<Arc<dyn ServerSession>> {
        self.directory.resolve_one(service, options)
    }

    /// Session addressed by a routing expression
    pub fn get_route_server(
        &self,
        expression: &str,
        options: &SelectOptions,
    ) -> CoreResult<Arc<dyn ServerSession>> {
        self.router().route(expression, options)
    }

    /// Calls `method` on the module addressed by `route`
    pub async fn invoke(&self, route: &str, method: &str, args: Vec<Value>) -> CallResult {
        self.dispatcher.invoke(route, method, args).await
    }

    /// Sends `method` to the module addressed by `route` without waiting
    pub async fn invoke_nr(&self, route: &str, method: &str, args: Vec<Value>) -> CoreResult<()> {
        self.dispatcher.invoke_nr(route, method, args).await
    }

    /// Calls `method` under `ctx` with selection options
    pub async fn call(
        &self,
        ctx: &CallContext,
        route: &str,
        method: &str,
        args: Vec<Value>,
        options: &SelectOptions,
    ) -> CallResult {
        self.dispatcher.call(ctx, route, method, args, options).await
    }

    /// Encodes a result envelope; a failed encoding is [`CoreError::Build`]
    pub fn protocol_marshal<T>(
        &self,
        trace: &str,
        result: &T,
        error: &str,
    ) -> CoreResult<ProtocolMarshal>
    where
        T: Serialize,
    {
        self.envelopes
            .build(trace, result, error)
            .map_err(CoreError::Build)
    }

    /// Wraps already encoded bytes as an envelope
    pub fn new_protocol_marshal(&self, data: Vec<u8>) -> ProtocolMarshal {
        ProtocolMarshal::new(data)
    }

    /// Runs until SIGINT, SIGTERM or SIGHUP, then drains
    pub async fn run(self: &Arc<Self>, mods: Vec<Arc<dyn Module>>) -> CoreResult<()> {
        self.run_until(mods, wait_for_signal()).await
    }

    /// Runs until `shutdown` resolves, then drains.
    ///
    /// Returns [`CoreError::ShutdownTimeout`] when teardown outlives
    /// `kill_wait_ttl`; the teardown task is abandoned in that case.
    pub async fn run_until<F>(
        self: &Arc<Self>,
        mods: Vec<Arc<dyn Module>>,
        shutdown: F,
    ) -> CoreResult<()>
    where
        F: Future<Output = CoreResult<Signal>>,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyRunning);
        }

        if let Err(e) = self.load_settings() {
            self.set_state(AppState::Stopped);
            return Err(e);
        }
        self.set_state(AppState::ConfigLoaded);
        if let Some(hook) = &self.hooks.configuration_loaded {
            hook(self.as_ref());
        }

        info!(
            version = %self.options.version,
            process_id = %self.options.process_id,
            "svcmesh starting up"
        );

        let mut manager = ModuleManager::new();
        manager.register_run_mod(Arc::new(TimerModule::new(Arc::clone(&self.wheel))));
        for module in mods {
            module.on_app_configuration_loaded(self);
            manager.register(module);
        }
        self.set_state(AppState::ModulesRegistered);

        if let Err(e) = manager.init(self).await {
            error!(error = %e, "module init failed");
            if !self.teardown_within(manager).await {
                warn!(
                    deadline = ?self.options.kill_wait_ttl,
                    "teardown after failed init timed out"
                );
            }
            self.set_state(AppState::Stopped);
            return Err(e);
        }
        if let Some(hook) = &self.hooks.startup {
            hook(self.as_ref());
        }
        self.set_state(AppState::Running);
        info!(
            version = %self.options.version,
            modules = ?manager.active_types(),
            "svcmesh started"
        );

        let (signal, signal_error) = match shutdown.await {
            Ok(signal) => (signal.to_string(), None),
            Err(e) => {
                error!(error = %e, "shutdown signal failed");
                ("error".to_string(), Some(e))
            }
        };

        self.drain(manager, signal).await?;
        match signal_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn drain(self: &Arc<Self>, manager: ModuleManager, signal: String) -> CoreResult<()> {
        if let Some(log) = &self.log_handle {
            log.flush();
        }
        self.set_state(AppState::Draining);

        if !self.teardown_within(manager).await {
            error!(
                signal = %signal,
                deadline = ?self.options.kill_wait_ttl,
                "svcmesh close timeout"
            );
            return Err(CoreError::ShutdownTimeout { signal });
        }

        self.set_state(AppState::Stopped);
        info!(signal = %signal, "svcmesh closing down");
        if let Some(log) = &self.log_handle {
            log.close();
        }
        Ok(())
    }

    /// Destroys every module and releases all sessions, bounded by
    /// `kill_wait_ttl`. Returns false when the deadline won; the teardown
    /// task is aborted in that case.
    async fn teardown_within(self: &Arc<Self>, mut manager: ModuleManager) -> bool {
        let app = Arc::clone(self);
        let mut teardown = tokio::spawn(async move {
            manager.destroy().await;
            app.on_destroy();
        });
        let deadline = self.options.kill_wait_ttl;

        tokio::select! {
            _ = sleep(deadline) => {
                teardown.abort();
                false
            }
            joined = &mut teardown => {
                if let Err(e) = joined {
                    warn!(error = %e, "teardown task failed");
                }
                true
            }
        }
    }

    fn load_settings(&self) -> CoreResult<()> {
        if let Some(path) = &self.options.conf_path {
            let settings = Settings::load_from_file(path)?;
            *self.settings.write() = Arc::new(settings);
        }
        Ok(())
    }

    fn on_destroy(&self) {
        self.directory.release_all();
    }

    fn set_state(&self, state: AppState) {
        *self.state.write() = state;
    }

    pub(crate) fn notify_module_inited(&self, module: &Arc<dyn Module>) {
        if let Some(hook) = &self.hooks.module_inited {
            hook(self, module.as_ref());
        }
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("version", &self.options.version)
            .field("process_id", &self.options.process_id)
            .field("state", &self.state())
            .field("sessions", &self.directory.len())
            .finish()
    }
}
