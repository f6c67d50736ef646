//! Benchmark orchestration engine
//!
//! Drives one run: selects artifacts, loads each in turn, runs the corpus
//! through it, aggregates, cleans up and persists a single summary. Every
//! failure inside a run ends up as data in the returned [`BenchmarkRun`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use bench_config::{BenchConfig, CorpusSettings, PacingSettings, SelectionSettings};
use common::error::{Error, FailureKind, Result};
use common::models::{ArtifactVariant, BenchmarkRun, CapabilityProfile, ImageResult, ModelResult};
use common::utils::{race_deadline, RaceOutcome};
use inference_engine::{image_name, ImageLoader, InferenceRunner};
use model_manager::{ArtifactHandle, ArtifactLoader, ArtifactSource, Detector};
use resource_manager::{ReclamationCoordinator, ResourceTracker};
use storage_adapter::{ExportDocument, SummaryRecord, TelemetryStore};

use crate::classifier::{FailureClassifier, KeywordClassifier};
use crate::lifecycle::RunLifecycle;
use crate::metrics::aggregate;
use crate::progress::{NoopProgress, ProgressEvent, ProgressSink, ProgressUpdate};
use crate::selection::{select, SelectionPlan};
use crate::state::{BenchmarkState, CANCELLED_REASON};

/// External collaborators of the orchestrator
#[derive(Clone)]
pub struct Collaborators {
    /// Artifact transport
    pub source: Arc<dyn ArtifactSource>,
    /// Inference runtime
    pub detector: Arc<dyn Detector>,
    /// Corpus reader
    pub image_loader: Arc<dyn ImageLoader>,
    /// Summary persistence
    pub store: Arc<dyn TelemetryStore>,
}

/// Result of one run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The finalized run
    pub run: BenchmarkRun,
    /// `Done` or `Aborted`
    pub final_state: BenchmarkState,
    /// Whether the summary record was stored
    pub persisted: bool,
    /// Tested artifacts times corpus size
    pub total_planned: usize,
}

impl RunOutcome {
    /// Export document of the run, stamped now
    pub fn export(&self) -> ExportDocument {
        ExportDocument::from_run(&self.run, Utc::now())
    }
}

/// Policy knobs the run loop reads
#[derive(Debug, Clone)]
struct RunSettings {
    batch_interval: usize,
    pacing: PacingSettings,
    selection: SelectionSettings,
    corpus: CorpusSettings,
    collection: String,
    persist_timeout: Duration,
}

/// The benchmark orchestrator
pub struct BenchmarkOrchestrator {
    /// Artifact loader
    loader: ArtifactLoader,

    /// Bounded detections
    runner: InferenceRunner,

    /// Reclamation passes
    reclaimer: Arc<ReclamationCoordinator>,

    /// Runtime resource accounting
    tracker: ResourceTracker,

    /// Summary persistence
    store: Arc<dyn TelemetryStore>,

    /// Memory exhaustion detection
    classifier: Arc<dyn FailureClassifier>,

    /// Progress reporting
    progress: Arc<dyn ProgressSink>,

    /// State and run exclusion
    lifecycle: RunLifecycle,

    /// Run policy
    settings: RunSettings,
}

impl BenchmarkOrchestrator {
    /// Creates a new orchestrator
    pub fn new(collaborators: Collaborators, config: &BenchConfig) -> Self {
        let tracker = ResourceTracker::new();
        let reclaimer = Arc::new(ReclamationCoordinator::new(
            Arc::new(tracker.clone()),
            config.reclamation.clone(),
        ));

        let loader = ArtifactLoader::new(
            collaborators.source,
            collaborators.detector.clone(),
            tracker.clone(),
            reclaimer.clone(),
            config.timeouts.clone(),
        );
        let runner = InferenceRunner::new(
            collaborators.detector,
            collaborators.image_loader,
            config.timeouts.clone(),
        );

        Self {
            loader,
            runner,
            reclaimer,
            tracker,
            store: collaborators.store,
            classifier: Arc::new(KeywordClassifier::default()),
            progress: Arc::new(NoopProgress),
            lifecycle: RunLifecycle::new(),
            settings: RunSettings {
                batch_interval: config.reclamation.batch_interval.max(1),
                pacing: config.pacing.clone(),
                selection: config.selection.clone(),
                corpus: config.corpus.clone(),
                collection: config.telemetry.collection.clone(),
                persist_timeout: config.timeouts.persist(),
            },
        }
    }

    /// Replaces the memory exhaustion classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replaces the progress sink
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Sets the class labels recorded with every detection
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.runner = self.runner.with_labels(labels);
        self
    }

    /// Current state
    pub fn state(&self) -> BenchmarkState {
        self.lifecycle.state()
    }

    /// Returns true while a run is in progress
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Reclamation coordinator shared with the loader
    pub fn reclaimer(&self) -> &ReclamationCoordinator {
        &self.reclaimer
    }

    /// Runtime resource accounting
    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    /// Plan a run on `profile` would follow
    pub fn plan(&self, profile: &CapabilityProfile) -> SelectionPlan {
        select(profile, &self.settings.selection, &self.settings.corpus)
    }

    /// Runs one benchmark.
    ///
    /// Fails only with [`Error::AlreadyRunning`] when another run is in
    /// progress; every other failure is recorded in the returned run.
    pub async fn run(
        &self,
        profile: &CapabilityProfile,
        device_id: &str,
        token: &CancellationToken,
    ) -> Result<RunOutcome> {
        let _guard = self.lifecycle.try_begin()?;

        let mut run = BenchmarkRun::new(device_id);
        info!("Starting benchmark run {} on {} ({})", run.run_id, device_id, profile);

        self.transition(BenchmarkState::SelectingArtifacts);
        let plan = self.plan(profile);
        run.results.extend(plan.skipped.iter().cloned());
        for skipped in &plan.skipped {
            info!("Skipping {}: {}", skipped.model_id, skipped.skip_reason.as_deref().unwrap_or_default());
        }

        let total_planned = plan.total_planned();
        let mut completed = 0usize;
        let mut abort_reason = None;

        info!(
            "Testing {} artifacts on {} inputs ({} planned)",
            plan.tested.len(),
            plan.corpus.len(),
            total_planned
        );

        for &variant in &plan.tested {
            if token.is_cancelled() {
                abort_reason = Some(CANCELLED_REASON.to_string());
                break;
            }

            self.transition(BenchmarkState::Preparing);
            self.reclaimer.reclaim(profile).await;

            let handle = match self.load(variant, profile, token).await {
                Ok(handle) => handle,
                Err(e) => {
                    if let Some(reason) = self.record_load_failure(&mut run, variant, e) {
                        abort_reason = Some(reason);
                        break;
                    }
                    continue;
                }
            };

            self.transition(BenchmarkState::TestingImages);
            let images = self
                .test_images(&handle, &plan.corpus, profile, &mut completed, total_planned, token)
                .await;

            self.transition(BenchmarkState::Aggregating);
            let result = aggregate(variant, handle.load_latency_ms(), images);
            info!(
                "{}: load {:.2} ms, avg detection {:.2} ms, avg score {:.3}, {} errors",
                result.model_id,
                result.load_latency_ms,
                result.avg_detection_time_ms,
                result.avg_score,
                result.error_count
            );
            run.results.push(result);

            self.transition(BenchmarkState::CleaningUp);
            handle.dispose();
            self.reclaimer.reclaim(profile).await;

            if token.is_cancelled() {
                abort_reason = Some(CANCELLED_REASON.to_string());
                break;
            }
        }

        self.transition(BenchmarkState::Persisting);
        let persisted = self.persist(&run).await;

        // Final reclamation once everything is released
        self.reclaimer.reclaim(profile).await;

        let final_state = match abort_reason {
            Some(reason) => BenchmarkState::Aborted(reason),
            None => BenchmarkState::Done,
        };
        self.transition(final_state.clone());

        info!(
            "Benchmark run {} finished: {} ({} results, {} of {} inputs)",
            run.run_id,
            final_state,
            run.results.len(),
            completed,
            total_planned
        );

        Ok(RunOutcome {
            run,
            final_state,
            persisted,
            total_planned,
        })
    }

    /// Acquires and warms up one artifact, reporting both states
    async fn load(
        &self,
        variant: ArtifactVariant,
        profile: &CapabilityProfile,
        token: &CancellationToken,
    ) -> Result<ArtifactHandle> {
        self.transition(BenchmarkState::Loading);
        let acquired = self.loader.acquire(variant, profile, token).await?;

        self.transition(BenchmarkState::Warming);
        self.loader.warm_up(acquired, profile, token).await
    }

    /// Records a failed load. Returns the abort reason if the run must stop.
    fn record_load_failure(&self, run: &mut BenchmarkRun, variant: ArtifactVariant, error: Error) -> Option<String> {
        let kind = self.classifier.classify(&error);
        let message = error.to_string();
        run.results.push(ModelResult::load_failed(variant, message.clone()));

        if error.is_cancelled() {
            return Some(CANCELLED_REASON.to_string());
        }

        if kind == FailureKind::MemoryExhaustion && variant.is_heaviest() {
            error!("Memory limit reached on {}, stopping: {}", variant, message);
            return Some(format!("Memory exhausted loading {}: {}", variant, message));
        }

        warn!("Skipping {} after {:?}: {}", variant, kind, message);
        None
    }

    /// Runs every corpus input through `handle`, in order
    async fn test_images(
        &self,
        handle: &ArtifactHandle,
        corpus: &[PathBuf],
        profile: &CapabilityProfile,
        completed: &mut usize,
        total_planned: usize,
        token: &CancellationToken,
    ) -> Vec<ImageResult> {
        let mut images = Vec::with_capacity(corpus.len());

        for path in corpus {
            if token.is_cancelled() {
                warn!("Run cancelled after {} of {} inputs", images.len(), corpus.len());
                break;
            }

            let result = self.runner.test_input(handle, path, token).await;
            images.push(result);
            *completed += 1;

            self.progress.report(ProgressEvent::Progress(ProgressUpdate {
                completed: *completed,
                total_planned,
                artifact: handle.variant(),
                image: image_name(path),
            }));

            // Periodic reclamation across the whole run
            if *completed % self.settings.batch_interval == 0 {
                self.reclaimer.reclaim(profile).await;
            }

            if profile.is_constrained()
                && self.settings.pacing.interval > 0
                && *completed % self.settings.pacing.interval == 0
            {
                tokio::time::sleep(self.settings.pacing.pause()).await;
            }
        }

        images
    }

    /// Writes the summary record once within the persist timeout; failures
    /// are logged and not retried
    async fn persist(&self, run: &BenchmarkRun) -> bool {
        let record = match SummaryRecord::from_run(run).and_then(|record| record.to_value()) {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to build benchmark summary: {}", e);
                return false;
            }
        };

        // Not tied to the run token: cancelled runs are persisted too
        let persist_token = CancellationToken::new();
        let outcome = race_deadline(
            self.store.create(&self.settings.collection, record),
            self.settings.persist_timeout,
            &persist_token,
        )
        .await;

        let failure = match outcome {
            RaceOutcome::Completed(Ok(())) => {
                info!("Benchmark summary saved to {}", self.settings.collection);
                return true;
            }
            RaceOutcome::Completed(Err(e)) => e,
            RaceOutcome::TimedOut | RaceOutcome::Cancelled => Error::Persistence(format!(
                "No response from telemetry store after {} ms",
                self.settings.persist_timeout.as_millis()
            )),
        };

        error!("Failed to save benchmark summary: {}", failure);
        false
    }

    fn transition(&self, next: BenchmarkState) {
        let from = self.lifecycle.transition_to(next.clone());
        self.progress.report(ProgressEvent::StateChanged { from, to: next });
    }
}
