//! Logging for Model Bench
//!
//! This crate installs the process-wide tracing subscriber, with an optional
//! JSON format and an optional daily-rolling log file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use bench_config::LoggingSettings;
use common::error::{Error, Result};

/// File name prefix of rolling log files
const LOG_FILE_PREFIX: &str = "model-bench.log";

/// Builds the filter, letting `RUST_LOG` override the configured level
pub fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.level)
            .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", settings.level, e))),
    }
}

/// Installs the global subscriber.
///
/// The returned guard flushes the log file on drop and must be kept alive for
/// the lifetime of the process when file logging is enabled.
pub fn init(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(settings)?;

    // Route `log` records from dependencies through tracing
    let _ = tracing_log::LogTracer::init();

    let console = if settings.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let (file_layer, guard) = match &settings.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(console)
        .with(file_layer)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to install log subscriber: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_rejected() {
        std::env::remove_var("RUST_LOG");
        let settings = LoggingSettings {
            level: "model_bench=loud".to_string(),
            ..LoggingSettings::default()
        };
        assert!(build_filter(&settings).is_err());
    }

    #[test]
    fn test_default_level_accepted() {
        std::env::remove_var("RUST_LOG");
        assert!(build_filter(&LoggingSettings::default()).is_ok());
    }
}
