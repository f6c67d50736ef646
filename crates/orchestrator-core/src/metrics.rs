//! Result aggregation
//!
//! Aggregates are a pure function of the image results, so recomputing them
//! on an already aggregated result changes nothing.

use common::models::{ArtifactVariant, ImageResult, ModelResult};

/// Summary of one artifact's image results
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aggregates {
    /// Detections over every input, failed ones included
    pub total_detections: u64,
    /// Failed inputs
    pub error_count: u32,
    /// Mean detection time over successful inputs, 0 when none
    pub avg_detection_time_ms: f64,
    /// Mean score over successful inputs, 0 when none
    pub avg_score: f64,
}

impl Aggregates {
    /// Computes the aggregates of `images`
    pub fn from_images(images: &[ImageResult]) -> Self {
        let total_detections = images.iter().map(|image| u64::from(image.detection_count)).sum();

        let successful: Vec<&ImageResult> = images.iter().filter(|image| !image.is_error()).collect();
        let error_count = (images.len() - successful.len()) as u32;

        let (avg_detection_time_ms, avg_score) = if successful.is_empty() {
            (0.0, 0.0)
        } else {
            let n = successful.len() as f64;
            (
                successful.iter().map(|image| image.detection_time_ms).sum::<f64>() / n,
                successful.iter().map(|image| image.score).sum::<f64>() / n,
            )
        };

        Self {
            total_detections,
            error_count,
            avg_detection_time_ms,
            avg_score,
        }
    }

    /// Writes the aggregates into `result`
    pub fn apply_to(&self, result: &mut ModelResult) {
        result.total_detections = self.total_detections;
        result.error_count = self.error_count;
        result.avg_detection_time_ms = self.avg_detection_time_ms;
        result.avg_score = self.avg_score;
    }
}

/// Builds the result of a tested artifact
pub fn aggregate(variant: ArtifactVariant, load_latency_ms: f64, images: Vec<ImageResult>) -> ModelResult {
    let mut result = ModelResult {
        model_id: variant.id().to_string(),
        load_latency_ms,
        images,
        total_detections: 0,
        error_count: 0,
        avg_detection_time_ms: 0.0,
        avg_score: 0.0,
        skip_reason: None,
        error_message: None,
    };
    reaggregate(&mut result);
    result
}

/// Recomputes the aggregates of a tested artifact from its images
pub fn reaggregate(result: &mut ModelResult) {
    Aggregates::from_images(&result.images).apply_to(result);
}
