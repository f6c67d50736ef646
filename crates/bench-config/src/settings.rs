//! Typed configuration sections and their defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Root configuration for a benchmark run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Device identity and signal overrides
    pub device: DeviceSettings,
    /// Bounds for collaborator calls
    pub timeouts: TimeoutSettings,
    /// Reclamation policy
    pub reclamation: ReclamationSettings,
    /// Pacing on constrained devices
    pub pacing: PacingSettings,
    /// Artifact selection policy
    pub selection: SelectionSettings,
    /// Capability classification thresholds
    pub profiler: ProfilerSettings,
    /// Input corpus
    pub corpus: CorpusSettings,
    /// Artifact location
    pub artifacts: ArtifactSettings,
    /// Summary persistence
    pub telemetry: TelemetrySettings,
    /// Log output
    pub logging: LoggingSettings,
}

/// Device identity and overrides for detected signals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Name recorded with every run
    pub device_id: Option<String>,
    /// Reported memory in GB, overrides detection
    pub memory_gb: Option<f64>,
    /// Platform string, overrides detection
    pub platform: Option<String>,
}

/// Bounds for collaborator calls, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Artifact acquisition
    pub load_ms: u64,
    /// Warmup inference after acquisition
    pub warmup_ms: u64,
    /// One detection
    pub detection_ms: u64,
    /// Reading and decoding one corpus item
    pub image_load_ms: u64,
    /// Writing the summary record
    pub persist_ms: u64,
}

impl TimeoutSettings {
    pub fn load(&self) -> Duration {
        Duration::from_millis(self.load_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn detection(&self) -> Duration {
        Duration::from_millis(self.detection_ms)
    }

    pub fn image_load(&self) -> Duration {
        Duration::from_millis(self.image_load_ms)
    }

    pub fn persist(&self) -> Duration {
        Duration::from_millis(self.persist_ms)
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            load_ms: 30_000,
            warmup_ms: 30_000,
            detection_ms: 15_000,
            image_load_ms: 10_000,
            persist_ms: 10_000,
        }
    }
}

/// Reclamation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReclamationSettings {
    /// Reclaim after every N processed inputs
    pub batch_interval: usize,
    /// Scheduler turns yielded per pass
    pub yield_cycles: u32,
    /// Scheduler turns yielded per pass on iOS-like platforms
    pub ios_yield_cycles: u32,
    /// Live resource count above which extra turns are yielded
    pub watermark: usize,
    /// Maximum extra turns when above the watermark
    pub extra_cycles: u32,
}

impl Default for ReclamationSettings {
    fn default() -> Self {
        Self {
            batch_interval: 10,
            yield_cycles: 4,
            ios_yield_cycles: 6,
            watermark: 20,
            extra_cycles: 3,
        }
    }
}

/// Pause inserted on low-end devices to keep the host responsive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingSettings {
    /// Pause after every N processed inputs
    pub interval: usize,
    /// Pause length in milliseconds
    pub pause_ms: u64,
}

impl PacingSettings {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            interval: 5,
            pause_ms: 200,
        }
    }
}

/// Artifact selection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    /// Skip the heaviest artifact at or below this reported memory (GB)
    pub skip_heaviest_at_or_below_gb: f64,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            skip_heaviest_at_or_below_gb: 3.0,
        }
    }
}

/// Capability classification thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerSettings {
    /// Memory assumed when the device reports none (GB)
    pub default_memory_gb: f64,
    /// Devices below this memory are low-end (GB)
    pub low_end_memory_gb: f64,
    /// Artifact budget on low-end devices
    pub low_end_budget_bytes: u64,
    /// Artifact budget otherwise
    pub default_budget_bytes: u64,
    /// Reclamation backoff on iOS-like platforms
    pub ios_delay_ms: u64,
    /// Reclamation backoff otherwise
    pub default_delay_ms: u64,
    /// Platform substrings marking a constrained device (case-insensitive)
    pub constrained_markers: Vec<String>,
    /// Platform substrings marking an iOS-like device (case-insensitive)
    pub ios_markers: Vec<String>,
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            default_memory_gb: 4.0,
            low_end_memory_gb: 4.0,
            low_end_budget_bytes: 80 * MIB,
            default_budget_bytes: 200 * MIB,
            ios_delay_ms: 2000,
            default_delay_ms: 1000,
            constrained_markers: vec!["iphone".into(), "ipad".into(), "android".into()],
            ios_markers: vec!["iphone".into(), "ipad".into()],
        }
    }
}

/// Input corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    /// Directory the files are read from
    pub dir: PathBuf,
    /// Ordered file names
    pub files: Vec<String>,
    /// Truncate the corpus to this many inputs on low-end devices
    pub constrained_limit: Option<usize>,
}

impl CorpusSettings {
    /// Full paths of the corpus, in order
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|file| self.dir.join(file)).collect()
    }
}

impl Default for CorpusSettings {
    fn default() -> Self {
        let mut files = Vec::with_capacity(40);
        files.push("card1.png".to_string());
        files.push("card2.jpeg".to_string());
        files.push("card3.png".to_string());
        files.extend((4..=10).map(|i| format!("card{}.jpg", i)));
        for kind in ["id", "face", "signature"] {
            files.extend((1..=10).map(|i| format!("{}{}.jpg", kind, i)));
        }

        Self {
            dir: PathBuf::from("images"),
            files,
            constrained_limit: None,
        }
    }
}

/// Where artifacts are acquired from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    /// Local directory holding `<id>_web_model/` folders
    pub root: Option<PathBuf>,
    /// Base URL serving `<id>_web_model/` folders
    pub base_url: Option<String>,
}

/// Summary persistence backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryBackend {
    /// Append to a JSON-lines file
    JsonLines,
    /// POST to a records endpoint
    Http,
    /// Keep summaries in memory only
    None,
}

/// Summary persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Collection the summary record is written to
    pub collection: String,
    /// Backend used for writes
    pub backend: TelemetryBackend,
    /// Directory of the JSON-lines backend
    pub path: PathBuf,
    /// Base URL of the HTTP backend
    pub url: Option<String>,
    /// Directory exports are written to
    pub export_dir: PathBuf,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            collection: "Benchmark".to_string(),
            backend: TelemetryBackend::JsonLines,
            path: PathBuf::from("telemetry"),
            url: None,
            export_dir: PathBuf::from("."),
        }
    }
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
    /// Also write to a daily-rolling file in this directory
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_corpus() {
        let corpus = CorpusSettings::default();
        assert_eq!(corpus.files.len(), 40);
        assert_eq!(corpus.files[0], "card1.png");
        assert_eq!(corpus.files[1], "card2.jpeg");
        assert_eq!(corpus.files[10], "id1.jpg");
        assert_eq!(corpus.files[39], "signature10.jpg");
        assert_eq!(corpus.paths()[20], PathBuf::from("images/face1.jpg"));
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = TimeoutSettings::default();
        assert_eq!(timeouts.load(), Duration::from_secs(30));
        assert_eq!(timeouts.detection(), Duration::from_secs(15));
        assert_eq!(timeouts.image_load(), Duration::from_secs(10));
    }
}
