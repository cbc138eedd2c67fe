//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::error::{LoadFrameError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` overrides the configured filter. Console output goes to
/// stderr; with `log_to_file` the same events are appended to the log file
/// from a background writer. Keep the returned guard alive until exit or
/// the tail of the file may be lost.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (file_layer, guard) = if config.log_to_file {
        let path = config.log_file_path();
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path.file_name().ok_or_else(|| {
            LoadFrameError::Config(format!("Log file {:?} has no file name", path))
        })?;
        std::fs::create_dir_all(directory)?;

        let appender = tracing_appender::rolling::never(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| LoadFrameError::Config(format!("Failed to initialize logging: {}", e)))?;

    if config.log_to_file {
        tracing::info!("Logging to {:?}", config.log_file_path());
    }
    Ok(guard)
}
