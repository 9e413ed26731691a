use anyhow::{Context, Result};
use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::domain::models::LoggingConfig;

const LOG_FILE_PREFIX: &str = "phylum";

/// Logger implementation using tracing.
///
/// Human-facing logs go to stderr so stdout stays clean for command output.
/// With `log_dir` set, a JSON copy of every event is written to rolling
/// files as well.
pub struct LoggerImpl {
    _guard: Option<WorkerGuard>,
}

impl LoggerImpl {
    /// Install the global subscriber.
    ///
    /// `RUST_LOG` directives refine the configured level. Fails if a global
    /// subscriber is already set.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let default_level = parse_log_level(&config.level)?;
        let env_filter = || {
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy()
        };

        let stderr_layer = if config.format == "json" {
            fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_target(true)
                .with_filter(env_filter())
                .boxed()
        } else {
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(console::colors_enabled_stderr())
                .with_target(false)
                .with_filter(env_filter())
                .boxed()
        };

        let (file_layer, guard) = match &config.log_dir {
            Some(log_dir) => {
                let (rotation, files_per_day) = match config.rotation.as_str() {
                    "hourly" => (Rotation::HOURLY, 24),
                    "never" => (Rotation::NEVER, 1),
                    _ => (Rotation::DAILY, 1),
                };
                let appender = RollingFileAppender::builder()
                    .rotation(rotation)
                    .filename_prefix(LOG_FILE_PREFIX)
                    .filename_suffix("log")
                    .max_log_files((config.retention_days.max(1) * files_per_day) as usize)
                    .build(log_dir)
                    .with_context(|| format!("Failed to open log directory {log_dir}"))?;
                let (writer, guard) = tracing_appender::non_blocking(appender);

                let layer = fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_filter(env_filter());
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .context("A global tracing subscriber is already installed")?;

        tracing::debug!(
            level = %config.level,
            format = %config.format,
            file_output = config.log_dir.is_some(),
            "logger initialized"
        );

        Ok(Self { _guard: guard })
    }
}

/// Parse log level string to Level
pub fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {level}"),
    }
}
