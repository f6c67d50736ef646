//! Common data models for Model Bench
//!
//! This module defines the benchmark data model shared across crates: the
//! closed artifact set, the capability profile, per-image and per-model
//! results and the run record that gets persisted and exported.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::utils::format_bytes;

const MIB: u64 = 1024 * 1024;

/// The benchmarked artifact variants, lightest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArtifactVariant {
    /// Nano detector
    Small,
    /// Small detector
    Medium,
    /// Medium detector, the heaviest of the set
    Large,
}

impl ArtifactVariant {
    /// Every variant in priority order
    pub const ALL: [ArtifactVariant; 3] = [
        ArtifactVariant::Small,
        ArtifactVariant::Medium,
        ArtifactVariant::Large,
    ];

    /// Identifier used for acquisition and in persisted summaries
    pub fn id(&self) -> &'static str {
        match self {
            ArtifactVariant::Small => "yolo11n",
            ArtifactVariant::Medium => "yolo11s",
            ArtifactVariant::Large => "yolo11m",
        }
    }

    /// Approximate resident size of the loaded weights
    pub fn estimated_bytes(&self) -> u64 {
        match self {
            ArtifactVariant::Small => 10 * MIB,
            ArtifactVariant::Medium => 36 * MIB,
            ArtifactVariant::Large => 77 * MIB,
        }
    }

    /// The variant dropped first under memory pressure
    pub fn heaviest() -> ArtifactVariant {
        ArtifactVariant::Large
    }

    /// Returns true for the heaviest variant
    pub fn is_heaviest(&self) -> bool {
        *self == Self::heaviest()
    }

    /// Returns true if loading this variant takes at least half of `budget_bytes`
    pub fn is_large_for(&self, budget_bytes: u64) -> bool {
        self.estimated_bytes().saturating_mul(2) >= budget_bytes
    }
}

impl fmt::Display for ArtifactVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ArtifactVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactVariant::ALL
            .into_iter()
            .find(|variant| variant.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown artifact: {}", s)))
    }
}

/// Classification of the device's resource budget, computed once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProfile {
    /// Reported device memory the classification was made from (GB)
    pub device_memory_gb: f64,
    /// Device is resource constrained
    pub low_end: bool,
    /// Platform behaves like iOS (slower reclamation)
    pub ios_like: bool,
    /// Memory budget for loaded artifacts
    pub max_memory_budget_bytes: u64,
    /// Backoff applied after reclamation on low-end devices
    pub reclamation_delay_ms: u64,
}

impl CapabilityProfile {
    /// Reclamation backoff as a duration
    pub fn reclamation_delay(&self) -> Duration {
        Duration::from_millis(self.reclamation_delay_ms)
    }

    /// Returns true if either constraint applies
    pub fn is_constrained(&self) -> bool {
        self.low_end || self.ios_like
    }
}

impl fmt::Display for CapabilityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} GB reported, low-end: {}, iOS-like: {}, budget: {}, reclamation delay: {}ms",
            self.device_memory_gb,
            self.low_end,
            self.ios_like,
            format_bytes(self.max_memory_budget_bytes),
            self.reclamation_delay_ms
        )
    }
}

/// Point-in-time view of live runtime resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Number of live resources
    pub live_resource_count: usize,
    /// Bytes held by live resources
    pub live_bytes: u64,
}

impl fmt::Display for MemorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} resources, {}", self.live_resource_count, format_bytes(self.live_bytes))
    }
}

/// Result of one (artifact, input) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    /// Corpus item name
    pub image_name: String,
    /// End-to-end detection time
    pub detection_time_ms: f64,
    /// Score of the first detection, 0 when none
    pub score: f64,
    /// Class of the first detection, -1 when none
    pub class_index: i32,
    /// Label of `class_index`
    pub class_name: String,
    /// Number of detections
    pub detection_count: u32,
    /// Failure description; set only for failed inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ImageResult {
    /// Class name recorded for failed inputs
    pub const ERROR_CLASS: &'static str = "error";

    /// Class name recorded when no label matches
    pub const UNKNOWN_CLASS: &'static str = "unknown";

    /// A failed input: zeroed fields plus the failure description
    pub fn failed(image_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            detection_time_ms: 0.0,
            score: 0.0,
            class_index: -1,
            class_name: Self::ERROR_CLASS.to_string(),
            detection_count: 0,
            error_message: Some(message.into()),
        }
    }

    /// Returns true if this input failed
    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Aggregated result of one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResult {
    /// Artifact identifier
    pub model_id: String,
    /// Acquisition plus warmup time
    pub load_latency_ms: f64,
    /// One entry per attempted input, in corpus order
    pub images: Vec<ImageResult>,
    /// Sum of detections over every input
    pub total_detections: u64,
    /// Failed inputs, or 1 for a failed load
    pub error_count: u32,
    /// Mean detection time over successful inputs
    pub avg_detection_time_ms: f64,
    /// Mean score over successful inputs
    pub avg_score: f64,
    /// Why the artifact was never attempted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Why the artifact failed to load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ModelResult {
    /// Record for an artifact removed by the selection policy
    pub fn skipped(variant: ArtifactVariant, reason: impl Into<String>) -> Self {
        Self {
            skip_reason: Some(reason.into()),
            ..Self::zeroed(variant)
        }
    }

    /// Record for an artifact whose load failed
    pub fn load_failed(variant: ArtifactVariant, message: impl Into<String>) -> Self {
        Self {
            error_count: 1,
            error_message: Some(message.into()),
            ..Self::zeroed(variant)
        }
    }

    fn zeroed(variant: ArtifactVariant) -> Self {
        Self {
            model_id: variant.id().to_string(),
            load_latency_ms: 0.0,
            images: Vec::new(),
            total_detections: 0,
            error_count: 0,
            avg_detection_time_ms: 0.0,
            avg_score: 0.0,
            skip_reason: None,
            error_message: None,
        }
    }

    /// Returns true if the artifact was never attempted
    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }

    /// Returns true if the artifact failed before testing images
    pub fn is_load_failure(&self) -> bool {
        self.error_message.is_some()
    }
}

/// One benchmark invocation; the unit persisted and exported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRun {
    /// Unique run identifier
    pub run_id: Uuid,
    /// Device the run was performed on
    pub device_id: String,
    /// Start timestamp
    pub started_at: DateTime<Utc>,
    /// Per-artifact results in the order they were produced
    pub results: Vec<ModelResult>,
}

impl BenchmarkRun {
    /// Starts an empty run for `device_id`
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            device_id: device_id.into(),
            started_at: Utc::now(),
            results: Vec::new(),
        }
    }

    /// Finds the result for an artifact
    pub fn result_for(&self, variant: ArtifactVariant) -> Option<&ModelResult> {
        self.results.iter().find(|result| result.model_id == variant.id())
    }

    /// Number of image results across all artifacts
    pub fn image_count(&self) -> usize {
        self.results.iter().map(|result| result.images.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_metadata() {
        assert_eq!(ArtifactVariant::heaviest(), ArtifactVariant::Large);
        assert!(ArtifactVariant::Large.is_heaviest());
        assert!(!ArtifactVariant::Small.is_heaviest());
        assert_eq!("YOLO11S".parse::<ArtifactVariant>().unwrap(), ArtifactVariant::Medium);
        assert!("yolo12x".parse::<ArtifactVariant>().is_err());

        let low_end_budget = 80 * MIB;
        assert!(ArtifactVariant::Large.is_large_for(low_end_budget));
        assert!(!ArtifactVariant::Small.is_large_for(low_end_budget));
        assert!(!ArtifactVariant::Large.is_large_for(200 * MIB));
    }

    #[test]
    fn test_result_constructors() {
        let skipped = ModelResult::skipped(ArtifactVariant::Large, "not enough RAM");
        assert!(skipped.is_skipped());
        assert_eq!(skipped.error_count, 0);
        assert_eq!(skipped.load_latency_ms, 0.0);
        assert!(skipped.images.is_empty());

        let failed = ModelResult::load_failed(ArtifactVariant::Small, "404");
        assert!(failed.is_load_failure());
        assert_eq!(failed.error_count, 1);
        assert_eq!(failed.model_id, "yolo11n");

        let image = ImageResult::failed("id1.jpg", "decode error");
        assert!(image.is_error());
        assert_eq!(image.class_index, -1);
        assert_eq!(image.class_name, "error");
    }

    #[test]
    fn test_run_serialization_shape() {
        let mut run = BenchmarkRun::new("pixel-7");
        run.results.push(ModelResult::skipped(ArtifactVariant::Large, "low memory"));

        let value = serde_json::to_value(&run).unwrap();
        assert_eq!(value["deviceId"], "pixel-7");
        assert_eq!(value["results"][0]["modelId"], "yolo11m");
        assert_eq!(value["results"][0]["skipReason"], "low memory");
        assert!(value["results"][0].get("errorMessage").is_none());
        assert_eq!(run.result_for(ArtifactVariant::Large).map(|r| r.is_skipped()), Some(true));
    }
}
