//! Main integration module for Model Bench
//!
//! This module wires configuration, device profiling, artifact sources and
//! telemetry stores into a benchmark orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use bench_config::{BenchConfig, ConfigManager, TelemetryBackend};
use common::models::CapabilityProfile;
use hardware_profiler::{CapabilityProfiler, DeviceSignals};
use inference_engine::FsImageLoader;
use model_manager::{ArtifactSource, Detector, DirectoryArtifactSource, HttpArtifactSource};
use orchestrator_core::{select, BenchmarkOrchestrator, Collaborators, RunOutcome, SelectionPlan};
use storage_adapter::{
    ExportDocument, HttpTelemetryStore, InMemoryTelemetryStore, JsonLinesTelemetryStore, SummaryRecord,
    TelemetryStore,
};

/// Device id recorded when none is configured
pub const DEFAULT_DEVICE_ID: &str = "local";

/// Main benchmark application
pub struct BenchmarkApp {
    /// Loaded configuration
    config: BenchConfig,

    /// Capability classification
    profiler: CapabilityProfiler,
}

impl BenchmarkApp {
    /// Loads the configuration from defaults, `path` and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let manager = ConfigManager::load(path).context("Failed to load configuration")?;
        Ok(Self::from_config(manager.into_config()))
    }

    /// Creates an application from an already loaded configuration
    pub fn from_config(config: BenchConfig) -> Self {
        let profiler = CapabilityProfiler::new(config.profiler.clone());
        Self { config, profiler }
    }

    /// Installs the global log subscriber
    pub fn init_logging(&self) -> Result<Option<WorkerGuard>> {
        Ok(logging::init(&self.config.logging)?)
    }

    /// Loaded configuration
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Device id recorded with runs
    pub fn device_id(&self) -> String {
        self.config
            .device
            .device_id
            .clone()
            .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string())
    }

    /// Host signals with configured overrides applied
    pub fn signals(&self) -> DeviceSignals {
        DeviceSignals::detect().with_overrides(&self.config.device)
    }

    /// Capability profile of this host
    pub fn profile(&self) -> CapabilityProfile {
        self.profiler.profile_and_log(&self.signals())
    }

    /// Plan a run on `profile` would follow
    pub fn plan(&self, profile: &CapabilityProfile) -> SelectionPlan {
        select(profile, &self.config.selection, &self.config.corpus)
    }

    /// Artifact source named by the configuration
    pub fn artifact_source(&self) -> Result<Arc<dyn ArtifactSource>> {
        let artifacts = &self.config.artifacts;

        if let Some(root) = &artifacts.root {
            info!("Loading artifacts from {}", root.display());
            return Ok(Arc::new(DirectoryArtifactSource::new(root.clone())));
        }

        if let Some(base_url) = &artifacts.base_url {
            info!("Downloading artifacts from {}", base_url);
            return Ok(Arc::new(HttpArtifactSource::new(
                base_url.clone(),
                self.config.timeouts.load(),
            )?));
        }

        bail!("No artifact location configured: set artifacts.root or artifacts.base_url")
    }

    /// Telemetry store named by the configuration
    pub fn telemetry_store(&self) -> Result<Arc<dyn TelemetryStore>> {
        let telemetry = &self.config.telemetry;

        let store: Arc<dyn TelemetryStore> = match telemetry.backend {
            TelemetryBackend::JsonLines => Arc::new(JsonLinesTelemetryStore::new(telemetry.path.clone())),
            TelemetryBackend::Http => match &telemetry.url {
                Some(url) => Arc::new(HttpTelemetryStore::new(url.clone(), self.config.timeouts.persist())?),
                None => bail!("telemetry.url is required by the http backend"),
            },
            TelemetryBackend::None => {
                warn!("Telemetry disabled, summaries are kept in memory only");
                Arc::new(InMemoryTelemetryStore::new())
            }
        };

        Ok(store)
    }

    /// Builds an orchestrator around `detector`
    pub fn orchestrator(&self, detector: Arc<dyn Detector>) -> Result<BenchmarkOrchestrator> {
        let collaborators = Collaborators {
            source: self.artifact_source()?,
            detector,
            image_loader: Arc::new(FsImageLoader::new()),
            store: self.telemetry_store()?,
        };

        Ok(BenchmarkOrchestrator::new(collaborators, &self.config))
    }

    /// Runs one benchmark and exports its results
    pub async fn run(&self, orchestrator: &BenchmarkOrchestrator, token: &CancellationToken) -> Result<(RunOutcome, PathBuf)> {
        let profile = self.profile();
        let outcome = orchestrator.run(&profile, &self.device_id(), token).await?;

        let export = outcome
            .export()
            .write_to_dir(&self.config.telemetry.export_dir)
            .await
            .context("Failed to export benchmark results")?;

        Ok((outcome, export))
    }
}

/// Summary record of an exported run
pub async fn summarize(path: &Path) -> Result<SummaryRecord> {
    let document = ExportDocument::read(path)
        .await
        .with_context(|| format!("Failed to read export {}", path.display()))?;
    Ok(SummaryRecord::from_document(&document)?)
}
