use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::event_log::JsonlSink;

const DEFAULT_LEVEL: &str = "info";
const DEFAULT_LOG_FILE: &str = "./logs/dedupr.log";

/// Where human-readable logs go and how much of them.
///
/// `TRACING_LEVEL` sets the console level. The log file always carries the
/// core's debug output as well, one line per commit phase.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
    pub file_path: PathBuf,
}

impl LogSettings {
    pub fn new(level: Option<String>, file_path: Option<String>) -> Self {
        Self {
            level: level
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
            file_path: PathBuf::from(file_path.unwrap_or_else(|| DEFAULT_LOG_FILE.to_string())),
        }
    }

    pub fn from_env() -> Self {
        Self::new(env::var("TRACING_LEVEL").ok(), env::var("LOG_FILE_PATH").ok())
    }

    pub fn console_filter(&self) -> String {
        self.level.clone()
    }

    pub fn file_filter(&self) -> String {
        format!("{},dedupr_core=debug", self.level)
    }

    /// Directory and file name for the appender.
    fn file_parts(&self) -> (PathBuf, PathBuf) {
        let dir = self
            .file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let name = self
            .file_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("dedupr.log"));
        (dir, name)
    }
}

/// Console plus log file. Keep the guard alive until exit so the file writer
/// drains.
pub fn init_logger(settings: &LogSettings) -> WorkerGuard {
    let (dir, name) = settings.file_parts();
    let file_appender = tracing_appender::rolling::never(&dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .without_time()
                .with_ansi(true)
                .with_filter(EnvFilter::new(settings.console_filter())),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(EnvFilter::new(settings.file_filter())),
        )
        .init();

    info!(
        "Logging at {} to stdout and {}",
        settings.level,
        settings.file_path.display()
    );

    guard
}

/// The machine-readable event log next to the text log. A run goes ahead
/// without it when the file cannot be opened.
pub fn open_event_log(path: &str) -> Option<JsonlSink> {
    match JsonlSink::open(Path::new(path)) {
        Ok(sink) => {
            info!("Recording events to {}", path);
            Some(sink)
        }
        Err(e) => {
            warn!("Event log {} unavailable: {}", path, e);
            None
        }
    }
}
