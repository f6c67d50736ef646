//! Configuration management for Model Bench
//!
//! This crate provides the typed benchmark configuration and its loading from
//! defaults, an optional file and the environment.

pub mod manager;
pub mod settings;
pub mod validation;

// Re-export commonly used types
pub use manager::ConfigManager;
pub use settings::{
    ArtifactSettings, BenchConfig, CorpusSettings, DeviceSettings, LoggingSettings, PacingSettings,
    ProfilerSettings, ReclamationSettings, SelectionSettings, TelemetryBackend, TelemetrySettings,
    TimeoutSettings,
};
