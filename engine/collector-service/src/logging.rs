//! Logging and tracing setup

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, prelude::*, util::SubscriberInitExt, EnvFilter};

/// Initialize logging and tracing
///
/// `RUST_LOG` takes precedence over the configured level. When logging to a
/// file the returned guard must be held until exit so buffered lines are
/// flushed.
pub fn initialize_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level {:?}", config.level))?;

    let (writer, guard, ansi) = match &config.file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(std::path::Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("log file {} has no file name", path.display()))?;
            std::fs::create_dir_all(directory)
                .with_context(|| format!("failed to create log directory {}", directory.display()))?;

            let appender = if config.rotation {
                tracing_appender::rolling::daily(directory, file_name)
            } else {
                tracing_appender::rolling::never(directory, file_name)
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (fmt::writer::BoxMakeWriter::new(writer), Some(guard), false)
        }
        None => (fmt::writer::BoxMakeWriter::new(std::io::stdout), None, true),
    };

    let fmt_layer = match config.format.as_str() {
        "json" => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .boxed(),
        "compact" => fmt::layer()
            .compact()
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        _ => fmt::layer()
            .pretty()
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(guard)
}
