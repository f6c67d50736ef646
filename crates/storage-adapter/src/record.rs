//! Summary record and export document
//!
//! The summary record flattens a run into one row per device: load time,
//! average detection time and average accuracy for every fixed artifact,
//! plus the complete run serialized into `fullData`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use common::error::{Error, Result};
use common::models::{ArtifactVariant, BenchmarkRun, ModelResult};
use common::utils::format_fixed2;

/// Value recorded for artifacts absent from the run
pub const MISSING_VALUE: &str = "0";

/// Complete run as exported and embedded in the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    /// Device the run was performed on
    pub device: String,
    /// Export time
    pub timestamp: DateTime<Utc>,
    /// Per-artifact results
    pub results: Vec<ModelResult>,
}

impl ExportDocument {
    /// Snapshot of `run` taken at `timestamp`
    pub fn from_run(run: &BenchmarkRun, timestamp: DateTime<Utc>) -> Self {
        Self {
            device: run.device_id.clone(),
            timestamp,
            results: run.results.clone(),
        }
    }

    /// Default export file name, `benchmark_{device}_{millis}.json`
    ///
    /// Characters of the device id other than ASCII alphanumerics, `-` and
    /// `_` are replaced with `_` so the name never leaves its directory.
    pub fn file_name(&self) -> String {
        let device: String = self
            .device
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("benchmark_{}_{}.json", device, self.timestamp.timestamp_millis())
    }

    /// Pretty-printed JSON
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the document into `dir` under its default file name
    pub async fn write_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, self.to_pretty_json()?).await?;
        info!("Exported benchmark results to {}", path.display());
        Ok(path)
    }

    /// Reads an exported document
    pub async fn read(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn result_for(&self, variant: ArtifactVariant) -> Option<&ModelResult> {
        self.results.iter().find(|result| result.model_id == variant.id())
    }
}

/// Flattened summary written to the telemetry collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Device the run was performed on
    pub device: String,

    /// `{id}_load_time`, `{id}_avg_detection`, `{id}_avg_accuracy` per artifact
    #[serde(flatten)]
    pub metrics: BTreeMap<String, String>,

    /// Serialized [`ExportDocument`]
    #[serde(rename = "fullData")]
    pub full_data: String,
}

impl SummaryRecord {
    /// Builds the summary of `document`
    pub fn from_document(document: &ExportDocument) -> Result<Self> {
        let mut metrics = BTreeMap::new();

        for variant in ArtifactVariant::ALL {
            let id = variant.id();
            let (load_time, avg_detection, avg_accuracy) = match document.result_for(variant) {
                Some(result) => (
                    format_fixed2(result.load_latency_ms),
                    format_fixed2(result.avg_detection_time_ms),
                    format_fixed2(result.avg_score * 100.0),
                ),
                None => (
                    MISSING_VALUE.to_string(),
                    MISSING_VALUE.to_string(),
                    MISSING_VALUE.to_string(),
                ),
            };

            metrics.insert(format!("{}_load_time", id), load_time);
            metrics.insert(format!("{}_avg_detection", id), avg_detection);
            metrics.insert(format!("{}_avg_accuracy", id), avg_accuracy);
        }

        Ok(Self {
            device: document.device.clone(),
            metrics,
            full_data: serde_json::to_string(document)?,
        })
    }

    /// Builds the summary of `run` as of now
    pub fn from_run(run: &BenchmarkRun) -> Result<Self> {
        Self::from_document(&ExportDocument::from_run(run, Utc::now()))
    }

    /// Metric value for `key`
    pub fn metric(&self, key: &str) -> Option<&str> {
        self.metrics.get(key).map(String::as_str)
    }

    /// JSON value handed to the telemetry store
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(Error::from)
    }
}
