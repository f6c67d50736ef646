//! Local artifact repository

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use common::error::{Error, Result};
use common::models::ArtifactVariant;

use crate::runtime::{ArtifactDescriptor, LoadedArtifact};
use crate::source::{artifact_folder, check_cancelled, ArtifactManifest, ArtifactSource, MANIFEST_FILE};

/// Reads artifacts from `<root>/<id>_web_model/`
#[derive(Debug, Clone)]
pub struct DirectoryArtifactSource {
    /// Directory holding the artifact folders
    root: PathBuf,
}

impl DirectoryArtifactSource {
    /// Creates a source rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Folder of `variant`
    pub fn folder(&self, variant: ArtifactVariant) -> PathBuf {
        self.root.join(artifact_folder(variant))
    }

    async fn read(path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| Error::Artifact(format!("Failed to read {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl ArtifactSource for DirectoryArtifactSource {
    async fn fetch(&self, variant: ArtifactVariant, token: CancellationToken) -> Result<LoadedArtifact> {
        let folder = self.folder(variant);
        debug!("Reading artifact {} from {}", variant, folder.display());

        let manifest = ArtifactManifest::parse(&Self::read(&folder.join(MANIFEST_FILE)).await?)?;
        let input_shape = manifest.resolved_shape()?;

        let mut weights = Vec::with_capacity(manifest.weight_files.len());
        let mut weight_bytes = 0u64;

        for file in &manifest.weight_files {
            check_cancelled(&token, variant)?;

            let shard = Self::read(&folder.join(file)).await?;
            weight_bytes += shard.len() as u64;
            weights.push(Bytes::from(shard));
        }

        Ok(LoadedArtifact::new(
            ArtifactDescriptor {
                id: variant.id().to_string(),
                input_shape,
                weight_bytes,
            },
            weights,
        ))
    }
}
