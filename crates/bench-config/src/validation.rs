//! Configuration validation

use common::error::{Error, Result};

use crate::settings::{BenchConfig, TelemetryBackend};

/// Rejects configurations the benchmark cannot run with
pub fn validate(config: &BenchConfig) -> Result<()> {
    let timeouts = &config.timeouts;
    for (name, value) in [
        ("timeouts.load_ms", timeouts.load_ms),
        ("timeouts.warmup_ms", timeouts.warmup_ms),
        ("timeouts.detection_ms", timeouts.detection_ms),
        ("timeouts.image_load_ms", timeouts.image_load_ms),
        ("timeouts.persist_ms", timeouts.persist_ms),
    ] {
        if value == 0 {
            return Err(Error::Config(format!("{} must be greater than zero", name)));
        }
    }

    if config.reclamation.batch_interval == 0 {
        return Err(Error::Config("reclamation.batch_interval must be greater than zero".into()));
    }

    if config.pacing.interval == 0 {
        return Err(Error::Config("pacing.interval must be greater than zero".into()));
    }

    if config.corpus.constrained_limit == Some(0) {
        return Err(Error::Config("corpus.constrained_limit must be greater than zero".into()));
    }

    if config.profiler.low_end_budget_bytes > config.profiler.default_budget_bytes {
        return Err(Error::Config(
            "profiler.low_end_budget_bytes exceeds profiler.default_budget_bytes".into(),
        ));
    }

    if config.telemetry.backend == TelemetryBackend::Http && config.telemetry.url.is_none() {
        return Err(Error::Config("telemetry.url is required for the http backend".into()));
    }

    if config.telemetry.collection.trim().is_empty() {
        return Err(Error::Config("telemetry.collection must not be empty".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&BenchConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = BenchConfig::default();
        config.timeouts.detection_ms = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("timeouts.detection_ms"));
    }

    #[test]
    fn test_zero_persist_timeout_rejected() {
        let mut config = BenchConfig::default();
        config.timeouts.persist_ms = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("timeouts.persist_ms"));
    }

    #[test]
    fn test_http_backend_requires_url() {
        let mut config = BenchConfig::default();
        config.telemetry.backend = TelemetryBackend::Http;
        assert!(validate(&config).is_err());

        config.telemetry.url = Some("https://telemetry.example".into());
        assert!(validate(&config).is_ok());
    }
}
