//! Capability profiler
//!
//! Classifies the device's resource budget. The classification is a pure
//! function of the signals and the thresholds it was built with.

use tracing::info;

use bench_config::ProfilerSettings;
use common::models::CapabilityProfile;

use crate::signals::DeviceSignals;

/// Capability profiler
#[derive(Debug, Clone)]
pub struct CapabilityProfiler {
    /// Classification thresholds
    settings: ProfilerSettings,
}

impl CapabilityProfiler {
    /// Creates a profiler with the given thresholds
    pub fn new(settings: ProfilerSettings) -> Self {
        Self { settings }
    }

    /// Memory the classification uses, falling back to the configured default
    pub fn reported_memory_gb(&self, signals: &DeviceSignals) -> f64 {
        signals.memory_gb.unwrap_or(self.settings.default_memory_gb)
    }

    /// Classifies `signals`
    pub fn profile(&self, signals: &DeviceSignals) -> CapabilityProfile {
        let memory_gb = self.reported_memory_gb(signals);
        let constrained_platform = matches_any(&signals.platform, &self.settings.constrained_markers);
        let ios_like = matches_any(&signals.platform, &self.settings.ios_markers);
        let low_end = memory_gb < self.settings.low_end_memory_gb || constrained_platform;

        CapabilityProfile {
            device_memory_gb: memory_gb,
            low_end,
            ios_like,
            max_memory_budget_bytes: if low_end {
                self.settings.low_end_budget_bytes
            } else {
                self.settings.default_budget_bytes
            },
            reclamation_delay_ms: if ios_like {
                self.settings.ios_delay_ms
            } else {
                self.settings.default_delay_ms
            },
        }
    }

    /// Classifies `signals` and logs the outcome
    pub fn profile_and_log(&self, signals: &DeviceSignals) -> CapabilityProfile {
        let profile = self.profile(signals);
        info!("Device capability profile: {}", profile);
        profile
    }
}

impl Default for CapabilityProfiler {
    fn default() -> Self {
        Self::new(ProfilerSettings::default())
    }
}

/// Case-insensitive substring match against any marker
fn matches_any(platform: &str, markers: &[String]) -> bool {
    let platform = platform.to_lowercase();
    markers
        .iter()
        .any(|marker| !marker.is_empty() && platform.contains(&marker.to_lowercase()))
}
