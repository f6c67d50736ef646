//! Ambient device signals
//!
//! The raw inputs of capability classification. Detection reads the host
//! through `sysinfo`; configuration can override either signal.

use serde::{Deserialize, Serialize};
use sysinfo::{System, SystemExt};
use tracing::debug;

use bench_config::DeviceSettings;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Signals the capability profile is computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSignals {
    /// Reported memory in GB, `None` when the device does not report it
    pub memory_gb: Option<f64>,

    /// Platform identifier (OS name, version, architecture or a user agent)
    pub platform: String,
}

impl DeviceSignals {
    /// Creates signals from explicit values
    pub fn new(memory_gb: Option<f64>, platform: impl Into<String>) -> Self {
        Self {
            memory_gb,
            platform: platform.into(),
        }
    }

    /// Reads the signals of the current host
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_memory();

        let total_bytes = system.total_memory();
        let memory_gb = if total_bytes > 0 {
            Some((total_bytes as f64 / GIB).round())
        } else {
            None
        };

        let platform = format!(
            "{} {} {}",
            system.name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            system.os_version().unwrap_or_default(),
            std::env::consts::ARCH
        );

        debug!("Detected device signals: memory {:?} GB, platform '{}'", memory_gb, platform);

        Self { memory_gb, platform }
    }

    /// Applies configured overrides on top of these signals
    pub fn with_overrides(mut self, settings: &DeviceSettings) -> Self {
        if let Some(memory_gb) = settings.memory_gb {
            self.memory_gb = Some(memory_gb);
        }
        if let Some(platform) = &settings.platform {
            self.platform = platform.clone();
        }
        self
    }
}
