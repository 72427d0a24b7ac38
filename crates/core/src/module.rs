//! Module system
//!
//! Modules are the units of application logic hosted by an [`App`]. The
//! [`ModuleManager`] initialises them strictly in registration order and tears
//! them down in reverse.

use crate::app::App;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use std::sync::Arc;
use svcmesh_config::ModuleSettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A unit of application logic
#[async_trait]
pub trait Module: Send + Sync {
    /// Module type; also the service name it registers under
    fn module_type(&self) -> &str;

    /// Module version
    fn version(&self) -> &str;

    /// Called once the settings file has been loaded, before registration
    fn on_app_configuration_loaded(&self, _app: &App) {}

    /// Initialises the module with its instance settings
    async fn on_init(&self, app: &Arc<App>, settings: &ModuleSettings) -> CoreResult<()>;

    /// Runs until `close` is cancelled
    async fn run(&self, close: CancellationToken) {
        close.cancelled().await;
    }

    /// Releases the module's resources
    async fn on_destroy(&self) -> CoreResult<()> {
        Ok(())
    }
}

struct ActiveModule {
    module: Arc<dyn Module>,
    settings: ModuleSettings,
    close: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Owns the registered modules and drives their lifecycle
#[derive(Default)]
pub struct ModuleManager {
    run_mods: Vec<Arc<dyn Module>>,
    mods: Vec<Arc<dyn Module>>,
    active: Vec<ActiveModule>,
}

impl ModuleManager {
    /// Creates an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module that runs only where the settings file assigns it
    pub fn register(&mut self, module: Arc<dyn Module>) {
        debug!(module = module.module_type(), "module registered");
        self.mods.push(module);
    }

    /// Registers a module that runs in every process
    pub fn register_run_mod(&mut self, module: Arc<dyn Module>) {
        debug!(module = module.module_type(), "run module registered");
        self.run_mods.push(module);
    }

    /// Number of registered modules
    pub fn registered(&self) -> usize {
        self.run_mods.len() + self.mods.len()
    }

    /// Types of the modules started by [`Self::init`], in start order
    pub fn active_types(&self) -> Vec<String> {
        self.active
            .iter()
            .map(|active| active.module.module_type().to_string())
            .collect()
    }

    /// Initialises and starts modules one at a time.
    ///
    /// Run modules go first, then every configured module in registration
    /// order. The application's module-inited hook runs after each.
    pub async fn init(&mut self, app: &Arc<App>) -> CoreResult<()> {
        let process_id = app.process_id().to_string();
        let settings_file = app.settings();
        let mut plan = Vec::new();

        for module in &self.run_mods {
            let settings = ModuleSettings::for_module(module.module_type(), &process_id);
            plan.push((Arc::clone(module), settings));
        }

        for module in &self.mods {
            let mut instances = settings_file.module_instances(module.module_type(), &process_id);
            match instances.next() {
                Some(settings) => {
                    for extra in instances {
                        warn!(
                            module = module.module_type(),
                            instance = %extra.id,
                            "extra instance for this process ignored"
                        );
                    }
                    plan.push((Arc::clone(module), settings.clone()));
                }
                None => info!(
                    module = module.module_type(),
                    process_id = %process_id,
                    "module not assigned to this process"
                ),
            }
        }

        for (module, settings) in plan {
            module
                .on_init(app, &settings)
                .await
                .map_err(|e| CoreError::Module {
                    module: module.module_type().to_string(),
                    message: e.to_string(),
                })?;

            let close = CancellationToken::new();
            let runner = Arc::clone(&module);
            let token = close.clone();
            let task = tokio::spawn(async move { runner.run(token).await });

            info!(
                module = module.module_type(),
                instance = %settings.id,
                version = module.version(),
                "module started"
            );
            app.notify_module_inited(&module);
            self.active.push(ActiveModule {
                module,
                settings,
                close,
                task: Some(task),
            });
        }

        Ok(())
    }

    /// Stops started modules in reverse start order
    pub async fn destroy(&mut self) {
        while let Some(mut active) = self.active.pop() {
            let module_type = active.module.module_type().to_string();
            active.close.cancel();
            if let Some(task) = active.task.take() {
                if let Err(e) = task.await {
                    warn!(module = %module_type, error = %e, "module run task failed");
                }
            }
            if let Err(e) = active.module.on_destroy().await {
                warn!(module = %module_type, error = %e, "module destroy failed");
            }
            info!(module = %module_type, instance = %active.settings.id, "module stopped");
        }
    }
}
