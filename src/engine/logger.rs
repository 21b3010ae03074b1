//! Structured logging for the downloader.
//!
//! Everything goes to the terminal; when `logging.log_to_file` is set the
//! same events are also written to a daily-rolling file in the log
//! directory, either as JSON lines or in the plain line format.

use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::engine::config_loader::AppConfig;

const LOG_FILE_NAME: &str = "err_downloader.log";

/// Error types for logging
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for logging operations
pub type LoggerResult<T> = Result<T, LoggerError>;

/// `RUST_LOG` wins over the configured level.
fn env_filter(level: &str) -> LoggerResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| LoggerError::Logging(e.to_string()))
}

fn file_writer(log_dir: &Path) -> LoggerResult<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)?;
    }
    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
    Ok(tracing_appender::non_blocking(appender))
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// or buffered file output is lost.
pub fn init_logger(config: &AppConfig) -> LoggerResult<Option<WorkerGuard>> {
    let level = &config.logging.log_level;
    let format = config.logging.log_format.as_str();
    let filter = env_filter(level)?;

    let terminal = fmt::layer()
        .with_target(false)
        .with_timer(ChronoUtc::new("%H:%M:%S".to_string()));

    let (file_layer, guard) = if config.logging.log_to_file {
        let (writer, guard) = file_writer(&config.log_dir())?;
        let layer = match format {
            "json" => fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339())
                .with_span_events(FmtSpan::CLOSE)
                .boxed(),
            _ => fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339())
                .with_span_events(FmtSpan::CLOSE)
                .boxed(),
        };
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(terminal)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggerError::Logging(e.to_string()))?;

    info!(
        log_format = format,
        log_level = %level,
        log_to_file = config.logging.log_to_file,
        "Logger initialized"
    );

    Ok(guard)
}
