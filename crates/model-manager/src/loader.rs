//! Artifact loader
//!
//! Acquisition and warmup are two bounded steps. Load latency runs from the
//! start of acquisition to the end of warmup; a reclamation pass performed
//! before acquisition is not part of it.

use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bench_config::TimeoutSettings;
use common::error::{Error, Result};
use common::models::{ArtifactVariant, CapabilityProfile};
use common::utils::{elapsed_ms, format_bytes, race_deadline, RaceOutcome};
use resource_manager::{ReclamationCoordinator, ResourceTracker, TrackedResource};

use crate::runtime::{Detector, InputTensor, LoadedArtifact};
use crate::source::ArtifactSource;

/// An acquired artifact that has not been warmed up yet
pub struct AcquiredArtifact {
    variant: ArtifactVariant,
    artifact: LoadedArtifact,
    resource: TrackedResource,
    started: Instant,
}

impl AcquiredArtifact {
    pub fn variant(&self) -> ArtifactVariant {
        self.variant
    }
}

/// A loaded, warmed-up artifact.
///
/// Owns the runtime resource holding the weights; the resource is released
/// when the handle is disposed or dropped.
pub struct ArtifactHandle {
    variant: ArtifactVariant,
    artifact: LoadedArtifact,
    load_latency_ms: f64,
    resource: TrackedResource,
}

impl ArtifactHandle {
    pub fn variant(&self) -> ArtifactVariant {
        self.variant
    }

    pub fn id(&self) -> &str {
        self.artifact.id()
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.artifact.input_shape()
    }

    /// Acquisition start to warmup end
    pub fn load_latency_ms(&self) -> f64 {
        self.load_latency_ms
    }

    /// Weights passed to the detector
    pub fn artifact(&self) -> &LoadedArtifact {
        &self.artifact
    }

    /// Releases the runtime resource
    pub fn dispose(self) {
        debug!("Disposing {} ({})", self.variant, format_bytes(self.resource.bytes()));
    }
}

impl fmt::Debug for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactHandle")
            .field("variant", &self.variant)
            .field("input_shape", &self.input_shape())
            .field("load_latency_ms", &self.load_latency_ms)
            .finish()
    }
}

/// Loads artifacts one at a time
pub struct ArtifactLoader {
    /// Transport
    source: Arc<dyn ArtifactSource>,

    /// Runtime used for warmup
    detector: Arc<dyn Detector>,

    /// Accounting for weights and warmup inputs
    tracker: ResourceTracker,

    /// Reclamation before large loads and after failures
    reclaimer: Arc<ReclamationCoordinator>,

    /// Load and warmup bounds
    timeouts: TimeoutSettings,
}

impl ArtifactLoader {
    /// Creates a new artifact loader
    pub fn new(
        source: Arc<dyn ArtifactSource>,
        detector: Arc<dyn Detector>,
        tracker: ResourceTracker,
        reclaimer: Arc<ReclamationCoordinator>,
        timeouts: TimeoutSettings,
    ) -> Self {
        Self {
            source,
            detector,
            tracker,
            reclaimer,
            timeouts,
        }
    }

    /// Acquires and warms up `variant`
    pub async fn load(
        &self,
        variant: ArtifactVariant,
        profile: &CapabilityProfile,
        token: &CancellationToken,
    ) -> Result<ArtifactHandle> {
        let acquired = self.acquire(variant, profile, token).await?;
        self.warm_up(acquired, profile, token).await
    }

    /// Fetches the weights of `variant` within the load timeout
    pub async fn acquire(
        &self,
        variant: ArtifactVariant,
        profile: &CapabilityProfile,
        token: &CancellationToken,
    ) -> Result<AcquiredArtifact> {
        // Make room before large artifacts on constrained devices
        if profile.is_constrained() && variant.is_large_for(profile.max_memory_budget_bytes) {
            info!(
                "Reclaiming before loading {} ({} of {} budget)",
                variant,
                format_bytes(variant.estimated_bytes()),
                format_bytes(profile.max_memory_budget_bytes)
            );
            self.reclaimer.reclaim(profile).await;
        }

        info!("Loading artifact {}", variant);
        let started = Instant::now();
        let fetch_token = token.child_token();

        let outcome = race_deadline(
            self.source.fetch(variant, fetch_token.clone()),
            self.timeouts.load(),
            &fetch_token,
        )
        .await;

        let artifact = match outcome {
            RaceOutcome::Completed(Ok(artifact)) => artifact,
            RaceOutcome::Completed(Err(e)) => {
                return Err(self.fail(variant, profile, wrap_load_error(variant, e)).await);
            }
            RaceOutcome::TimedOut => {
                let e = Error::LoadTimeout {
                    model_id: variant.id().to_string(),
                    timeout: self.timeouts.load(),
                };
                return Err(self.fail(variant, profile, e).await);
            }
            RaceOutcome::Cancelled => {
                return Err(Error::Cancelled(format!("Load of {} cancelled", variant)));
            }
        };

        let resource = self
            .tracker
            .allocate(format!("{} weights", variant), artifact.descriptor.weight_bytes);

        debug!(
            "Acquired {} ({}, input {:?})",
            variant,
            format_bytes(artifact.descriptor.weight_bytes),
            artifact.input_shape()
        );

        Ok(AcquiredArtifact {
            variant,
            artifact,
            resource,
            started,
        })
    }

    /// Runs one inference on an all-ones input within the warmup timeout
    pub async fn warm_up(
        &self,
        acquired: AcquiredArtifact,
        profile: &CapabilityProfile,
        token: &CancellationToken,
    ) -> Result<ArtifactHandle> {
        let variant = acquired.variant;
        let input = match InputTensor::ones(acquired.artifact.input_shape()) {
            Ok(input) => input,
            Err(e) => {
                drop(acquired);
                return Err(self.fail(variant, profile, e).await);
            }
        };
        let input_resource = self
            .tracker
            .allocate(format!("{} warmup input", variant), input.byte_len());

        let warmup_token = token.child_token();
        let outcome = race_deadline(
            self.detector.execute(&acquired.artifact, &input, warmup_token.clone()),
            self.timeouts.warmup(),
            &warmup_token,
        )
        .await;

        // The warmup input never outlives the warmup
        input_resource.dispose();
        drop(input);

        let failure = match outcome {
            RaceOutcome::Completed(Ok(())) => None,
            RaceOutcome::Completed(Err(e)) => Some(wrap_load_error(variant, e)),
            RaceOutcome::TimedOut => Some(Error::LoadTimeout {
                model_id: variant.id().to_string(),
                timeout: self.timeouts.warmup(),
            }),
            RaceOutcome::Cancelled => {
                return Err(Error::Cancelled(format!("Warmup of {} cancelled", variant)));
            }
        };

        if let Some(e) = failure {
            drop(acquired);
            return Err(self.fail(variant, profile, e).await);
        }

        let load_latency_ms = elapsed_ms(acquired.started);
        info!("Artifact {} loaded in {:.2} ms", variant, load_latency_ms);

        Ok(ArtifactHandle {
            variant,
            artifact: acquired.artifact,
            load_latency_ms,
            resource: acquired.resource,
        })
    }

    /// Logs a load failure and reclaims what it left behind
    async fn fail(&self, variant: ArtifactVariant, profile: &CapabilityProfile, error: Error) -> Error {
        warn!("Failed to load {}: {}", variant, error);
        self.reclaimer.reclaim(profile).await;
        error
    }
}

/// Wraps transport and runtime failures as artifact errors, keeping typed failures
fn wrap_load_error(variant: ArtifactVariant, error: Error) -> Error {
    match error {
        e @ (Error::Artifact(_) | Error::LoadTimeout { .. } | Error::MemoryExhaustion(_) | Error::Cancelled(_)) => e,
        other => Error::Artifact(format!("Failed to load {}: {}", variant, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bench_config::ReclamationSettings;
    use bytes::Bytes;
    use resource_manager::RuntimeMemory;

    use crate::runtime::{ArtifactDescriptor, DecodedImage, DetectionOutput};

    enum Behavior {
        Succeed(Duration),
        Fail(fn() -> Error),
        Hang,
        Shape([usize; 4]),
    }

    struct FakeSource {
        behavior: Behavior,
        fetch_token: Arc<parking_lot::Mutex<Option<CancellationToken>>>,
    }

    #[async_trait]
    impl ArtifactSource for FakeSource {
        async fn fetch(&self, variant: ArtifactVariant, token: CancellationToken) -> Result<LoadedArtifact> {
            match &self.behavior {
                Behavior::Succeed(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(LoadedArtifact::new(
                        ArtifactDescriptor {
                            id: variant.id().to_string(),
                            input_shape: [1, 8, 8, 3],
                            weight_bytes: 4096,
                        },
                        vec![Bytes::from_static(&[0u8; 16])],
                    ))
                }
                Behavior::Shape(input_shape) => Ok(LoadedArtifact::new(
                    ArtifactDescriptor {
                        id: variant.id().to_string(),
                        input_shape: *input_shape,
                        weight_bytes: 4096,
                    },
                    vec![Bytes::from_static(&[0u8; 16])],
                )),
                Behavior::Fail(error) => Err(error()),
                Behavior::Hang => {
                    *self.fetch_token.lock() = Some(token.clone());
                    futures::future::pending().await
                }
            }
        }
    }

    struct FakeDetector {
        warmup_delay: Duration,
        executions: AtomicUsize,
    }

    #[async_trait]
    impl Detector for FakeDetector {
        async fn execute(&self, _artifact: &LoadedArtifact, input: &InputTensor, _token: CancellationToken) -> Result<()> {
            assert!(input.data.iter().all(|v| *v == 1.0));
            self.executions.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.warmup_delay).await;
            Ok(())
        }

        async fn detect(
            &self,
            _artifact: &LoadedArtifact,
            _image: &DecodedImage,
            _token: CancellationToken,
        ) -> Result<DetectionOutput> {
            Ok(DetectionOutput::default())
        }
    }

    struct Fixture {
        loader: ArtifactLoader,
        tracker: ResourceTracker,
        reclaimer: Arc<ReclamationCoordinator>,
        detector: Arc<FakeDetector>,
        fetch_token: Arc<parking_lot::Mutex<Option<CancellationToken>>>,
    }

    fn fixture(behavior: Behavior, warmup_delay: Duration) -> Fixture {
        let tracker = ResourceTracker::new();
        let reclaimer = Arc::new(ReclamationCoordinator::new(
            Arc::new(tracker.clone()) as Arc<dyn RuntimeMemory>,
            ReclamationSettings::default(),
        ));
        let fetch_token = Arc::new(parking_lot::Mutex::new(None));
        let detector = Arc::new(FakeDetector {
            warmup_delay,
            executions: AtomicUsize::new(0),
        });
        let source = Arc::new(FakeSource {
            behavior,
            fetch_token: fetch_token.clone(),
        });

        Fixture {
            loader: ArtifactLoader::new(
                source,
                detector.clone(),
                tracker.clone(),
                reclaimer.clone(),
                TimeoutSettings::default(),
            ),
            tracker,
            reclaimer,
            detector,
            fetch_token,
        }
    }

    fn profile(low_end: bool) -> CapabilityProfile {
        CapabilityProfile {
            device_memory_gb: if low_end { 2.0 } else { 16.0 },
            low_end,
            ios_like: false,
            max_memory_budget_bytes: if low_end { 80 << 20 } else { 200 << 20 },
            reclamation_delay_ms: 1000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_measures_acquisition_through_warmup() {
        let f = fixture(Behavior::Succeed(Duration::from_millis(100)), Duration::from_millis(50));

        let handle = f
            .loader
            .load(ArtifactVariant::Small, &profile(false), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handle.id(), "yolo11n");
        assert_eq!(handle.input_shape(), [1, 8, 8, 3]);
        assert!((handle.load_latency_ms() - 150.0).abs() < 1.0);
        assert_eq!(f.detector.executions.load(Ordering::SeqCst), 1);

        // Only the weights stay live; the warmup input is gone
        assert_eq!(f.tracker.snapshot().live_resource_count, 1);
        handle.dispose();
        assert_eq!(f.tracker.snapshot().live_resource_count, 0);
        assert_eq!(f.reclaimer.passes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_artifact_on_low_end_reclaims_first() {
        let f = fixture(Behavior::Succeed(Duration::from_millis(100)), Duration::from_millis(50));

        let handle = f
            .loader
            .load(ArtifactVariant::Large, &profile(true), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(f.reclaimer.passes(), 1);
        // The 1000 ms reclamation backoff is not part of the latency
        assert!((handle.load_latency_ms() - 150.0).abs() < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_source_times_out_and_is_cancelled() {
        let f = fixture(Behavior::Hang, Duration::ZERO);
        let start = Instant::now();

        let result = f
            .loader
            .load(ArtifactVariant::Medium, &profile(false), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::LoadTimeout { .. })));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(f.reclaimer.passes(), 1);
        assert_eq!(f.tracker.snapshot().live_resource_count, 0);

        // The losing fetch was told to stop
        let token = f.fetch_token.lock().clone().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_artifact_error() {
        let f = fixture(Behavior::Fail(|| Error::Io(std::io::Error::other("connection reset"))), Duration::ZERO);

        let result = f
            .loader
            .load(ArtifactVariant::Small, &profile(false), &CancellationToken::new())
            .await;

        match result {
            Err(Error::Artifact(message)) => assert!(message.contains("connection reset")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(f.reclaimer.passes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_exhaustion_is_preserved() {
        let f = fixture(
            Behavior::Fail(|| Error::MemoryExhaustion("out of memory".into())),
            Duration::ZERO,
        );

        let result = f
            .loader
            .load(ArtifactVariant::Large, &profile(false), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::MemoryExhaustion(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_warmup_is_load_timeout() {
        let f = fixture(Behavior::Succeed(Duration::ZERO), Duration::from_secs(60));

        let result = f
            .loader
            .load(ArtifactVariant::Small, &profile(false), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::LoadTimeout { timeout, .. }) if timeout == Duration::from_secs(30)));
        assert_eq!(f.tracker.snapshot().live_resource_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbuildable_input_shape_is_artifact_error() {
        let f = fixture(Behavior::Shape([usize::MAX / 2, 4, 1, 1]), Duration::ZERO);

        let result = f
            .loader
            .load(ArtifactVariant::Small, &profile(false), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::Artifact(_))));
        assert_eq!(f.detector.executions.load(Ordering::SeqCst), 0);
        assert_eq!(f.tracker.snapshot().live_resource_count, 0);
        assert_eq!(f.reclaimer.passes(), 1);
    }
}
