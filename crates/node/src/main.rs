//! svcmesh Node - standalone node daemon
//!
//! Hosts modules on an in-process registry and loopback transport, routes
//! calls between them, and drains within the configured kill-wait deadline
//! when SIGINT, SIGTERM or SIGHUP arrives.
//!
//! Usage:
//!   svcmesh-node --config server.toml --process-id development
//!
//! Exceeding the drain deadline aborts the process.

mod echo;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use echo::{EchoModule, ECHO_MODULE_TYPE};
use logging::{init_tracing, LoggingOptions};
use std::{path::PathBuf, sync::Arc, time::Duration};
use svcmesh_config::{AppOptions, ModuleSettings, Settings};
use svcmesh_core::{App, CoreError, Module};
use svcmesh_local::{LoopbackFactory, LoopbackTransport, MemoryRegistry, RegistrySelector};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "svcmesh-node", about = "svcmesh node daemon", version)]
struct Cli {
    /// Path to the settings file (TOML, or JSON with a .json extension).
    #[arg(long, short = 'c', env = "SVCMESH_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Process group whose module instances run here.
    #[arg(long, env = "SVCMESH_PROCESS_ID", value_name = "ID", default_value = "development")]
    process_id: String,

    /// Maximum drain duration on shutdown, in seconds.
    #[arg(long, env = "SVCMESH_KILL_WAIT", value_name = "SECONDS")]
    kill_wait: Option<u64>,

    /// Remote call expiry, in seconds.
    #[arg(long, env = "SVCMESH_RPC_EXPIRED", value_name = "SECONDS")]
    rpc_expired: Option<u64>,

    /// Registry heartbeat interval, in seconds.
    #[arg(long, env = "SVCMESH_REGISTER_INTERVAL", value_name = "SECONDS")]
    register_interval: Option<u64>,

    /// Registry entry TTL, in seconds.
    #[arg(long, env = "SVCMESH_REGISTER_TTL", value_name = "SECONDS")]
    register_ttl: Option<u64>,

    /// Log file or directory.
    #[arg(long, value_name = "PATH", env = "SVCMESH_LOG_PATH")]
    log_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL", env = "SVCMESH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json, pretty).
    #[arg(long, value_name = "FORMAT", env = "SVCMESH_LOG_FORMAT")]
    log_format: Option<String>,

    /// Run without console output.
    #[arg(long, short = 'd', env = "SVCMESH_DAEMON")]
    daemon: bool,

    /// Validate the settings file and exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let options = app_options(&cli);

    let logging_options = logging_options(&cli, &options, &settings);
    let logging_handles = Arc::new(init_tracing(&logging_options)?);

    if cli.check_config {
        info!(
            target: "svcmesh",
            modules = settings.module.len(),
            "settings validated; exiting due to --check-config"
        );
        return Ok(());
    }

    let config_source = cli
        .config
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<built-in>".to_string());
    info!(
        target: "svcmesh",
        version = %options.version,
        process_id = %options.process_id,
        config = %config_source,
        kill_wait_secs = options.kill_wait_ttl.as_secs(),
        "using application options"
    );

    let registry = MemoryRegistry::new();
    let transport = LoopbackTransport::new();
    let selector = Arc::new(RegistrySelector::new(registry.clone()));
    let factory =
        Arc::new(LoopbackFactory::new(transport.clone()).with_rpc_expired(options.rpc_expired));

    let reaper_token = CancellationToken::new();
    let reaper = registry.spawn_reaper(options.register_interval, reaper_token.clone());

    let mut builder = App::builder(options, selector, factory)
        .log_handle(logging_handles.clone())
        .on_startup(|app| {
            info!(
                target: "svcmesh",
                sessions = app.directory().len(),
                "svcmesh-node started; press Ctrl+C to stop"
            )
        });
    if cli.config.is_none() {
        builder = builder.settings(settings);
    }
    let app = builder.build();

    let modules: Vec<Arc<dyn Module>> = vec![Arc::new(EchoModule::new(registry, transport))];
    let outcome = app.run(modules).await;

    reaper_token.cancel();
    let _ = reaper.await;

    match outcome {
        Ok(()) => {
            info!(target: "svcmesh", "shutdown complete");
            Ok(())
        }
        Err(CoreError::ShutdownTimeout { signal }) => {
            error!(target: "svcmesh", signal = %signal, "drain deadline exceeded; aborting");
            eprintln!("svcmesh close timeout (signal: {signal})");
            std::process::abort();
        }
        Err(err) => Err(anyhow::Error::new(err).context("svcmesh-node failed")),
    }
}

/// Settings from `--config`, or a built-in layout running one echo instance
fn load_settings(cli: &Cli) -> Result<Settings> {
    match &cli.config {
        Some(path) => Settings::load_from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => Ok(default_settings(&cli.process_id)),
    }
}

fn default_settings(process_id: &str) -> Settings {
    let mut settings = Settings::default();
    settings.module.insert(
        ECHO_MODULE_TYPE.to_string(),
        vec![ModuleSettings::for_module("echo-1", process_id)],
    );
    settings
}

fn app_options(cli: &Cli) -> AppOptions {
    let mut options = AppOptions::default()
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_process_id(cli.process_id.clone())
        .with_debug(!cli.daemon);
    if let Some(path) = &cli.config {
        options = options.with_conf_path(path);
    }
    if let Some(secs) = cli.kill_wait {
        options = options.with_kill_wait_ttl(Duration::from_secs(secs));
    }
    if let Some(secs) = cli.rpc_expired {
        options = options.with_rpc_expired(Duration::from_secs(secs));
    }
    let interval = cli
        .register_interval
        .map(Duration::from_secs)
        .unwrap_or(options.register_interval);
    let ttl = cli
        .register_ttl
        .map(Duration::from_secs)
        .unwrap_or(options.register_ttl);
    options = options.with_registration(interval, ttl);
    if let Some(path) = &cli.log_path {
        options = options.with_log_dir(path);
    }
    options
}

/// The `[log]` table, overridden by CLI level/format and the options' log
/// destination and debug flag
fn logging_options(cli: &Cli, options: &AppOptions, settings: &Settings) -> LoggingOptions {
    let mut logging = LoggingOptions::from_settings(&settings.log);
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        logging.format = format.to_ascii_lowercase();
    }
    if let Some(dir) = &options.log_dir {
        logging.file = Some(dir.clone());
    }
    logging.console = logging.console && options.debug;
    logging
}
