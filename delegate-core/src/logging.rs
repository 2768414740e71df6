//! Tracing setup for native hosts.
//!
//! The library only emits `tracing` events; embedding applications decide
//! where they go. `init_logging` is the batteries-included option: an
//! `EnvFilter` (`RUST_LOG` wins over the configured level) plus either a
//! stderr formatter or a JSON-lines rolling file written off-thread by
//! `tracing-appender`.

use std::path::PathBuf;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Directory for JSON log files; `None` logs to stderr.
    pub log_dir: Option<PathBuf>,
    pub log_file_prefix: CompactString,
    pub log_level: CompactString,
    pub max_log_files: usize,
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Hourly,
    Daily,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            log_file_prefix: CompactString::const_new("delegate"),
            log_level: CompactString::const_new("info"),
            max_log_files: 10,
            rotation: LogRotation::Daily,
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Check a config without touching the global subscriber.
pub fn validate_config(config: &LoggerConfig) -> Result<(), LoggingError> {
    if config.max_log_files == 0 {
        return Err(LoggingError::ConfigError(
            "max_log_files must be > 0".to_string(),
        ));
    }

    if config.log_file_prefix.trim().is_empty() {
        return Err(LoggingError::ConfigError(
            "log_file_prefix must not be empty".to_string(),
        ));
    }

    config
        .log_level
        .parse::<Directive>()
        .map_err(|e| LoggingError::ConfigError(format!("log_level '{}': {e}", config.log_level)))?;

    Ok(())
}

fn build_filter(config: &LoggerConfig) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(config.log_level.as_str())
            .map_err(|e| LoggingError::ConfigError(e.to_string())),
    }
}

/// Install the global subscriber.
///
/// Returns the appender's `WorkerGuard` when logging to files; keep it alive
/// for as long as logs should be flushed.
pub fn init_logging(config: &LoggerConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    validate_config(config)?;
    let filter = build_filter(config)?;

    match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;

            let file_appender = RollingFileAppender::builder()
                .rotation(config.rotation.into())
                .filename_prefix(config.log_file_prefix.as_str())
                .filename_suffix("jsonl")
                .max_log_files(config.max_log_files)
                .build(dir)
                .map_err(|e| LoggingError::ConfigError(e.to_string()))?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_ansi(false)
                        .with_writer(non_blocking),
                )
                .try_init()
                .map_err(|_| LoggingError::AlreadyInitialized)?;

            Ok(Some(guard))
        }

        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .map_err(|_| LoggingError::AlreadyInitialized)?;

            Ok(None)
        }
    }
}
