//! Inference runtime seam
//!
//! Loaded artifacts are executed by a [`Detector`]. Warmup feeds it a
//! synthetic tensor; the benchmark feeds it decoded corpus images.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use common::error::{Error, Result};

/// Static description of an acquired artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    /// Artifact identifier
    pub id: String,
    /// Expected input shape, batch first
    pub input_shape: [usize; 4],
    /// Total size of the weights
    pub weight_bytes: u64,
}

/// Artifact weights as delivered by a source
#[derive(Clone)]
pub struct LoadedArtifact {
    /// Static description
    pub descriptor: ArtifactDescriptor,
    /// Weight shards in manifest order
    pub weights: Vec<Bytes>,
}

impl LoadedArtifact {
    /// Creates an artifact from its descriptor and shards
    pub fn new(descriptor: ArtifactDescriptor, weights: Vec<Bytes>) -> Self {
        Self { descriptor, weights }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.descriptor.input_shape
    }
}

impl fmt::Debug for LoadedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedArtifact")
            .field("descriptor", &self.descriptor)
            .field("shards", &self.weights.len())
            .finish()
    }
}

/// Largest input the warmup builds, in elements
pub const MAX_INPUT_ELEMENTS: usize = 1 << 24;

/// Number of elements of `shape`, rejecting shapes that overflow or exceed
/// [`MAX_INPUT_ELEMENTS`]
pub fn element_count(shape: [usize; 4]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |len, dim| len.checked_mul(*dim))
        .filter(|len| *len <= MAX_INPUT_ELEMENTS)
        .ok_or_else(|| {
            Error::Artifact(format!(
                "Input shape {:?} exceeds {} elements",
                shape, MAX_INPUT_ELEMENTS
            ))
        })
}

/// Dense f32 tensor
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl InputTensor {
    /// Tensor of `shape` filled with ones, the warmup input
    pub fn ones(shape: [usize; 4]) -> Result<Self> {
        let len = element_count(shape)?;
        Ok(Self {
            shape,
            data: vec![1.0; len],
        })
    }

    /// Size of the tensor data in bytes
    pub fn byte_len(&self) -> u64 {
        (self.data.len() * std::mem::size_of::<f32>()) as u64
    }
}

/// Decoded corpus image in RGB8
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Corpus item name
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Row-major RGB bytes
    pub pixels: Vec<u8>,
}

/// One detection reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Confidence in [0, 1]
    pub score: f64,
    /// Predicted class
    pub class_index: i32,
}

/// Detections of one image, best first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionOutput {
    pub detections: Vec<Detection>,
}

impl DetectionOutput {
    /// The detection whose score and class get recorded
    pub fn first(&self) -> Option<&Detection> {
        self.detections.first()
    }
}

/// Executes loaded artifacts
#[async_trait]
pub trait Detector: Send + Sync {
    /// Runs the artifact on a raw tensor, discarding the output
    async fn execute(&self, artifact: &LoadedArtifact, input: &InputTensor, token: CancellationToken) -> Result<()>;

    /// Runs detection on one image, pre- and post-processing included
    async fn detect(
        &self,
        artifact: &LoadedArtifact,
        image: &DecodedImage,
        token: CancellationToken,
    ) -> Result<DetectionOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ones_tensor() {
        let tensor = InputTensor::ones([1, 4, 4, 3]).unwrap();
        assert_eq!(tensor.data.len(), 48);
        assert!(tensor.data.iter().all(|v| *v == 1.0));
        assert_eq!(tensor.byte_len(), 192);
    }

    #[test]
    fn test_oversized_shapes_are_rejected() {
        let overflow = InputTensor::ones([usize::MAX / 2, 4, 1, 1]);
        assert!(matches!(overflow, Err(Error::Artifact(_))));

        let too_large = InputTensor::ones([1, 8192, 8192, 3]);
        assert!(matches!(too_large, Err(Error::Artifact(_))));

        assert_eq!(element_count([1, 640, 640, 3]).unwrap(), 1_228_800);
    }

    #[test]
    fn test_first_detection() {
        let output = DetectionOutput {
            detections: vec![
                Detection { score: 0.9, class_index: 2 },
                Detection { score: 0.4, class_index: 0 },
            ],
        };
        assert_eq!(output.first().map(|d| d.class_index), Some(2));
        assert!(DetectionOutput::default().first().is_none());
    }
}
