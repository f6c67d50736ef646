//! Inference runner
//!
//! Runs one detection against one input under a timeout. Failures of any
//! kind come back as zeroed [`ImageResult`]s carrying the error message, so
//! callers always get exactly one result per attempted input.

use std::path::Path;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use bench_config::TimeoutSettings;
use common::error::{Error, Result};
use common::models::ImageResult;
use common::utils::{elapsed_ms, race_deadline, RaceOutcome};
use model_manager::{ArtifactHandle, DecodedImage, Detector};

use crate::corpus::{image_name, ImageLoader};

/// Runs detections for the loaded artifact
pub struct InferenceRunner {
    /// Inference runtime
    detector: Arc<dyn Detector>,

    /// Corpus reader
    image_loader: Arc<dyn ImageLoader>,

    /// Detection and image load bounds
    timeouts: TimeoutSettings,

    /// Class labels indexed by class
    labels: Vec<String>,
}

impl InferenceRunner {
    /// Creates a new inference runner
    pub fn new(detector: Arc<dyn Detector>, image_loader: Arc<dyn ImageLoader>, timeouts: TimeoutSettings) -> Self {
        Self {
            detector,
            image_loader,
            timeouts,
            labels: Vec::new(),
        }
    }

    /// Sets the labels used for `class_name`
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Label of `class_index`, or `"unknown"`
    pub fn class_name(&self, class_index: i32) -> String {
        usize::try_from(class_index)
            .ok()
            .and_then(|index| self.labels.get(index))
            .cloned()
            .unwrap_or_else(|| ImageResult::UNKNOWN_CLASS.to_string())
    }

    /// Loads one corpus item within the image load timeout
    pub async fn load_image(&self, path: &Path, token: &CancellationToken) -> Result<DecodedImage> {
        let load_token = token.child_token();
        let outcome = race_deadline(
            self.image_loader.load(path, load_token.clone()),
            self.timeouts.image_load(),
            &load_token,
        )
        .await;

        match outcome {
            RaceOutcome::Completed(Ok(image)) => Ok(image),
            RaceOutcome::Completed(Err(e @ (Error::ImageLoad(_) | Error::Cancelled(_)))) => Err(e),
            RaceOutcome::Completed(Err(e)) => Err(Error::ImageLoad(e.to_string())),
            RaceOutcome::TimedOut => Err(Error::ImageLoad(format!(
                "Loading {} timed out after {} ms",
                path.display(),
                self.timeouts.image_load_ms
            ))),
            RaceOutcome::Cancelled => Err(Error::Cancelled(format!("Load of {} cancelled", path.display()))),
        }
    }

    /// Runs one detection on `image`. Never fails.
    pub async fn run(&self, handle: &ArtifactHandle, image: &DecodedImage, token: &CancellationToken) -> ImageResult {
        let detect_token = token.child_token();
        let start = Instant::now();

        let outcome = race_deadline(
            self.detector.detect(handle.artifact(), image, detect_token.clone()),
            self.timeouts.detection(),
            &detect_token,
        )
        .await;

        match outcome {
            RaceOutcome::Completed(Ok(output)) => {
                let detection_time_ms = elapsed_ms(start);
                let (score, class_index) = output
                    .first()
                    .map(|detection| (detection.score, detection.class_index))
                    .unwrap_or((0.0, -1));

                debug!(
                    "{} on {}: {} detections in {:.2} ms",
                    handle.id(),
                    image.name,
                    output.detections.len(),
                    detection_time_ms
                );

                ImageResult {
                    image_name: image.name.clone(),
                    detection_time_ms,
                    score,
                    class_index,
                    class_name: self.class_name(class_index),
                    detection_count: output.detections.len() as u32,
                    error_message: None,
                }
            }
            RaceOutcome::Completed(Err(e)) => {
                warn!("Detection failed for {} on {}: {}", handle.id(), image.name, e);
                ImageResult::failed(image.name.clone(), e.to_string())
            }
            RaceOutcome::TimedOut => {
                let e = Error::DetectionTimeout(self.timeouts.detection());
                warn!("{} on {}: {}", handle.id(), image.name, e);
                ImageResult::failed(image.name.clone(), e.to_string())
            }
            RaceOutcome::Cancelled => {
                ImageResult::failed(image.name.clone(), Error::Cancelled("Detection cancelled".into()).to_string())
            }
        }
    }

    /// Loads `path` and runs one detection on it. Never fails.
    pub async fn test_input(&self, handle: &ArtifactHandle, path: &Path, token: &CancellationToken) -> ImageResult {
        match self.load_image(path, token).await {
            Ok(image) => self.run(handle, &image, token).await,
            Err(e) => {
                warn!("Failed to load {}: {}", path.display(), e);
                ImageResult::failed(image_name(path), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use async_trait::async_trait;
    use bench_config::ReclamationSettings;
    use bytes::Bytes;
    use model_manager::{
        ArtifactDescriptor, ArtifactLoader, ArtifactSource, Detection, DetectionOutput, InputTensor, LoadedArtifact,
    };
    use resource_manager::{ReclamationCoordinator, ResourceTracker};

    use common::models::{ArtifactVariant, CapabilityProfile};

    struct StaticSource;

    #[async_trait]
    impl ArtifactSource for StaticSource {
        async fn fetch(&self, variant: ArtifactVariant, _token: CancellationToken) -> Result<LoadedArtifact> {
            Ok(LoadedArtifact::new(
                ArtifactDescriptor {
                    id: variant.id().to_string(),
                    input_shape: [1, 2, 2, 3],
                    weight_bytes: 64,
                },
                vec![Bytes::from_static(&[0u8; 64])],
            ))
        }
    }

    /// Detector that answers after a fixed delay
    struct DelayedDetector {
        delay: Duration,
        detections: Vec<Detection>,
        fail: bool,
        last_token: parking_lot::Mutex<Option<CancellationToken>>,
    }

    impl DelayedDetector {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                detections: vec![
                    Detection { score: 0.87, class_index: 1 },
                    Detection { score: 0.5, class_index: 0 },
                ],
                fail: false,
                last_token: parking_lot::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Detector for DelayedDetector {
        async fn execute(&self, _artifact: &LoadedArtifact, _input: &InputTensor, _token: CancellationToken) -> Result<()> {
            Ok(())
        }

        async fn detect(
            &self,
            _artifact: &LoadedArtifact,
            _image: &DecodedImage,
            token: CancellationToken,
        ) -> Result<DetectionOutput> {
            *self.last_token.lock() = Some(token);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(Error::Artifact("tensor shape mismatch".into()));
            }
            Ok(DetectionOutput {
                detections: self.detections.clone(),
            })
        }
    }

    struct FakeImages {
        delay: Duration,
    }

    #[async_trait]
    impl ImageLoader for FakeImages {
        async fn load(&self, path: &Path, _token: CancellationToken) -> Result<DecodedImage> {
            tokio::time::sleep(self.delay).await;
            if path.to_string_lossy().contains("broken") {
                return Err(Error::ImageLoad(format!("Failed to decode {}", path.display())));
            }
            Ok(DecodedImage {
                name: image_name(path),
                width: 2,
                height: 2,
                pixels: vec![0; 12],
            })
        }
    }

    fn image() -> DecodedImage {
        DecodedImage {
            name: "card1.png".into(),
            width: 2,
            height: 2,
            pixels: vec![0; 12],
        }
    }

    async fn handle_for(detector: Arc<DelayedDetector>) -> ArtifactHandle {
        let tracker = ResourceTracker::new();
        let reclaimer = Arc::new(ReclamationCoordinator::new(
            Arc::new(tracker.clone()),
            ReclamationSettings::default(),
        ));
        let loader = ArtifactLoader::new(
            Arc::new(StaticSource),
            detector,
            tracker,
            reclaimer,
            TimeoutSettings::default(),
        );
        let profile = CapabilityProfile {
            device_memory_gb: 8.0,
            low_end: false,
            ios_like: false,
            max_memory_budget_bytes: 200 << 20,
            reclamation_delay_ms: 1000,
        };
        loader
            .load(ArtifactVariant::Small, &profile, &CancellationToken::new())
            .await
            .unwrap()
    }

    fn runner(detector: Arc<DelayedDetector>, image_delay: Duration) -> InferenceRunner {
        InferenceRunner::new(detector, Arc::new(FakeImages { delay: image_delay }), TimeoutSettings::default())
            .with_labels(vec!["id_card".into(), "passport".into()])
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_just_before_deadline_is_normal() {
        let detector = Arc::new(DelayedDetector::new(Duration::from_millis(14_999)));
        let handle = handle_for(detector.clone()).await;

        let result = runner(detector, Duration::ZERO)
            .run(&handle, &image(), &CancellationToken::new())
            .await;

        assert!(!result.is_error());
        assert!((result.detection_time_ms - 14_999.0).abs() < 1.0);
        assert_eq!(result.score, 0.87);
        assert_eq!(result.class_index, 1);
        assert_eq!(result.class_name, "passport");
        assert_eq!(result.detection_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_detection_times_out_zeroed() {
        let detector = Arc::new(DelayedDetector::new(Duration::from_secs(60)));
        let handle = handle_for(detector.clone()).await;
        let start = Instant::now();

        let result = runner(detector.clone(), Duration::ZERO)
            .run(&handle, &image(), &CancellationToken::new())
            .await;

        assert_eq!(start.elapsed(), Duration::from_millis(15_000));
        assert!(result.is_error());
        assert_eq!(result.detection_time_ms, 0.0);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.class_index, -1);
        assert_eq!(result.detection_count, 0);
        assert!(result.error_message.unwrap().contains("Detection timeout"));

        // The abandoned detection was cancelled
        let token = detector.last_token.lock().clone().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detector_failure_becomes_error_result() {
        let mut detector = DelayedDetector::new(Duration::from_millis(5));
        detector.fail = true;
        let detector = Arc::new(detector);
        let handle = handle_for(detector.clone()).await;

        let result = runner(detector, Duration::ZERO)
            .run(&handle, &image(), &CancellationToken::new())
            .await;

        assert_eq!(result.class_name, "error");
        assert!(result.error_message.unwrap().contains("tensor shape mismatch"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_detections() {
        let mut detector = DelayedDetector::new(Duration::from_millis(5));
        detector.detections.clear();
        let detector = Arc::new(detector);
        let handle = handle_for(detector.clone()).await;

        let result = runner(detector, Duration::ZERO)
            .run(&handle, &image(), &CancellationToken::new())
            .await;

        assert!(!result.is_error());
        assert_eq!(result.class_index, -1);
        assert_eq!(result.class_name, "unknown");
        assert_eq!(result.detection_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_load_failures() {
        let detector = Arc::new(DelayedDetector::new(Duration::from_millis(5)));
        let handle = handle_for(detector.clone()).await;
        let token = CancellationToken::new();

        let broken = runner(detector.clone(), Duration::ZERO)
            .test_input(&handle, &PathBuf::from("images/broken.jpg"), &token)
            .await;
        assert_eq!(broken.image_name, "broken.jpg");
        assert_eq!(broken.class_name, "error");

        let slow = runner(detector, Duration::from_secs(11))
            .test_input(&handle, &PathBuf::from("images/id1.jpg"), &token)
            .await;
        assert!(slow.error_message.unwrap().contains("timed out"));
    }

    #[test]
    fn test_class_names() {
        let detector = Arc::new(DelayedDetector::new(Duration::ZERO));
        let runner = runner(detector, Duration::ZERO);
        assert_eq!(runner.class_name(0), "id_card");
        assert_eq!(runner.class_name(7), "unknown");
        assert_eq!(runner.class_name(-1), "unknown");
    }
}
