//! Tracing initialisation for the daemon.

use anyhow::{Context, Result};
use chrono::Local;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use svcmesh_core::LogHandle;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard};
use tracing_subscriber::{fmt, EnvFilter};

/// Logger knobs, read from the `[log]` table and overridden by CLI flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    pub level: String,
    pub format: String,
    pub file: Option<PathBuf>,
    pub console: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
            console: true,
        }
    }
}

impl LoggingOptions {
    /// Reads `level`, `format`, `file` and `console` from a settings log table
    pub fn from_settings(log: &Map<String, Value>) -> Self {
        let mut options = Self::default();
        if let Some(level) = log.get("level").and_then(Value::as_str) {
            options.level = level.to_string();
        }
        if let Some(format) = log.get("format").and_then(Value::as_str) {
            options.format = format.to_ascii_lowercase();
        }
        options.file = log
            .get("file")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        if let Some(console) = log.get("console").and_then(Value::as_bool) {
            options.console = console;
        }
        options
    }
}

/// Keeps the file writer alive; closing drops the guard, flushing the file.
///
/// `flush` only reaches stderr. Records queued for the non-blocking file
/// writer drain on its worker thread and are guaranteed on disk only after
/// `close`.
pub struct LoggingHandles {
    guard: Mutex<Option<WorkerGuard>>,
}

impl LogHandle for LoggingHandles {
    fn flush(&self) {
        let _ = io::stderr().flush();
    }

    fn close(&self) {
        self.flush();
        drop(self.guard.lock().take());
    }
}

pub fn init_tracing(options: &LoggingOptions) -> Result<LoggingHandles> {
    use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

    let level = options.level.as_str();
    let filter_spec = format!("{level},svcmesh={level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_spec));

    let mut guard = None;
    let file_writer = match &options.file {
        Some(path) => {
            let (writer, file_guard) = create_file_writer(path)?;
            guard = Some(file_guard);
            Some(writer)
        }
        None => None,
    };

    let has_file = file_writer.is_some();
    let writer: BoxMakeWriter = match (file_writer, options.console) {
        (Some(file), true) => BoxMakeWriter::new(io::stderr.and(file)),
        (Some(file), false) => BoxMakeWriter::new(file),
        (None, true) => BoxMakeWriter::new(io::stderr),
        (None, false) => BoxMakeWriter::new(io::sink),
    };

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(options.console && !has_file);

    match options.format.as_str() {
        "json" => {
            let _ = builder.json().try_init();
        }
        "pretty" => {
            let _ = builder.pretty().try_init();
        }
        _ => {
            let _ = builder.try_init();
        }
    }
    Ok(LoggingHandles {
        guard: Mutex::new(guard),
    })
}

fn create_file_writer(provided: &Path) -> Result<(non_blocking::NonBlocking, WorkerGuard)> {
    let file_path = resolve_log_path(provided)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&file_path)
        .with_context(|| format!("failed to open log file {}", file_path.display()))?;
    Ok(non_blocking(file))
}

/// A path with an extension names the file; anything else is a directory
fn resolve_log_path(provided: &Path) -> Result<PathBuf> {
    let file_path = if provided.is_file() || provided.extension().is_some() {
        provided.to_path_buf()
    } else {
        fs::create_dir_all(provided)
            .with_context(|| format!("failed to create log directory {}", provided.display()))?;
        provided.join(default_log_name())
    };

    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
    }
    Ok(file_path)
}

fn default_log_name() -> String {
    format!("svcmesh-node-{}.log", Local::now().format("%Y-%m-%d"))
}
