//! Remote artifact downloader
//!
//! Fetches the same folder layout as [`DirectoryArtifactSource`] over HTTP,
//! streaming each shard and stopping as soon as the token is cancelled.
//!
//! [`DirectoryArtifactSource`]: crate::repository::DirectoryArtifactSource

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use common::error::{Error, Result};
use common::models::ArtifactVariant;
use common::utils::format_bytes;

use crate::runtime::{ArtifactDescriptor, LoadedArtifact};
use crate::source::{artifact_folder, check_cancelled, ArtifactManifest, ArtifactSource, MANIFEST_FILE};

/// Time allowed to establish a connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Downloads artifacts from `<base_url>/<id>_web_model/`
#[derive(Debug, Clone)]
pub struct HttpArtifactSource {
    /// HTTP client
    client: Client,

    /// Base URL without trailing slash
    base_url: String,
}

impl HttpArtifactSource {
    /// Creates a downloader for `base_url` whose requests end after `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("model-bench/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Creates a downloader sharing an existing client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// URL of a file inside the folder of `variant`
    pub fn file_url(&self, variant: ArtifactVariant, file: &str) -> String {
        format!("{}/{}/{}", self.base_url, artifact_folder(variant), file)
    }

    /// Downloads one file, checking `token` between chunks
    async fn download(&self, variant: ArtifactVariant, url: &str, token: &CancellationToken) -> Result<Bytes> {
        let request = self.client.get(url).send();

        let resp = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled(format!("Fetch of {} cancelled", variant))),
            resp = request => resp.map_err(|e| Error::Artifact(format!("Failed to download {}: {}", url, e)))?,
        };

        if !resp.status().is_success() {
            return Err(Error::Artifact(format!(
                "Failed to download {}: HTTP {}",
                url,
                resp.status()
            )));
        }

        let mut body = BytesMut::new();
        let mut stream = resp.bytes_stream();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Cancelled(format!("Fetch of {} cancelled", variant))),
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(chunk) => {
                    let chunk = chunk.map_err(|e| Error::Artifact(format!("Failed to download {}: {}", url, e)))?;
                    body.extend_from_slice(&chunk);
                }
                None => break,
            }
        }

        trace!("Downloaded {} ({})", url, format_bytes(body.len() as u64));
        Ok(body.freeze())
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    async fn fetch(&self, variant: ArtifactVariant, token: CancellationToken) -> Result<LoadedArtifact> {
        let manifest_url = self.file_url(variant, MANIFEST_FILE);
        debug!("Downloading artifact {} from {}", variant, manifest_url);

        let manifest = ArtifactManifest::parse(&self.download(variant, &manifest_url, &token).await?)?;
        let input_shape = manifest.resolved_shape()?;

        let mut weights = Vec::with_capacity(manifest.weight_files.len());
        let mut weight_bytes = 0u64;

        for file in &manifest.weight_files {
            check_cancelled(&token, variant)?;

            let shard = self.download(variant, &self.file_url(variant, file), &token).await?;
            weight_bytes += shard.len() as u64;
            weights.push(shard);
        }

        debug!("Downloaded artifact {} ({})", variant, format_bytes(weight_bytes));

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
