//! Artifact acquisition transport
//!
//! Every artifact is published as a folder `<id>_web_model/` holding a
//! `model.json` manifest and the weight shards it lists.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use common::error::{Error, Result};
use common::models::ArtifactVariant;

use crate::runtime::{element_count, LoadedArtifact};

/// Manifest file name inside an artifact folder
pub const MANIFEST_FILE: &str = "model.json";

/// Delivers artifacts; may fail or hang
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Fetches the weights of `variant`. Implementations stop when `token` is cancelled.
    async fn fetch(&self, variant: ArtifactVariant, token: CancellationToken) -> Result<LoadedArtifact>;
}

/// Folder name of a variant
pub fn artifact_folder(variant: ArtifactVariant) -> String {
    format!("{}_web_model", variant.id())
}

/// Parsed `model.json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    /// Input shape; dynamic dimensions are negative or null
    pub input_shape: Vec<Option<i64>>,
    /// Shard file names relative to the folder
    pub weight_files: Vec<String>,
}

impl ArtifactManifest {
    /// Parses a manifest document
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let manifest: ArtifactManifest = serde_json::from_slice(raw)?;
        if manifest.weight_files.is_empty() {
            return Err(Error::Artifact("Manifest lists no weight files".to_string()));
        }
        Ok(manifest)
    }

    /// Input shape with dynamic dimensions resolved to 1
    pub fn resolved_shape(&self) -> Result<[usize; 4]> {
        if self.input_shape.len() != 4 {
            return Err(Error::Artifact(format!(
                "Expected a 4-dimensional input shape, got {} dimensions",
                self.input_shape.len()
            )));
        }

        let mut shape = [1usize; 4];
        for (slot, dim) in shape.iter_mut().zip(&self.input_shape) {
            if let Some(dim) = dim.filter(|d| *d > 0) {
                *slot = usize::try_from(dim)
                    .map_err(|_| Error::Artifact(format!("Input dimension {} is too large", dim)))?;
            }
        }

        element_count(shape)?;
        Ok(shape)
    }
}

/// Fails with `Cancelled` once `token` is cancelled
pub(crate) fn check_cancelled(token: &CancellationToken, variant: ArtifactVariant) -> Result<()> {
    if token.is_cancelled() {
        return Err(Error::Cancelled(format!("Fetch of {} cancelled", variant)));
    }
    Ok(())
}
