//! Corpus image loading and decoding

use std::path::Path;

use async_trait::async_trait;
use image::ImageReader;
use std::io::Cursor;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use common::error::{Error, Result};
use model_manager::DecodedImage;

/// Reads and decodes corpus items; fails on I/O or decode errors
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, path: &Path, token: CancellationToken) -> Result<DecodedImage>;
}

/// Name recorded for a corpus item
pub fn image_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Loads images from the filesystem, decoding on the blocking pool
#[derive(Debug, Clone, Copy, Default)]
pub struct FsImageLoader;

impl FsImageLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ImageLoader for FsImageLoader {
    async fn load(&self, path: &Path, token: CancellationToken) -> Result<DecodedImage> {
        let name = image_name(path);

        let bytes = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled(format!("Load of {} cancelled", name))),
            bytes = tokio::fs::read(path) => bytes
                .map_err(|e| Error::ImageLoad(format!("Failed to read {}: {}", path.display(), e)))?,
        };

        let decoded = tokio::task::spawn_blocking(move || decode(name, &bytes))
            .await
            .map_err(|e| Error::ImageLoad(format!("Decoder task failed: {}", e)))??;

        trace!("Decoded {} ({}x{})", decoded.name, decoded.width, decoded.height);
        Ok(decoded)
    }
}

/// Decodes an encoded image into RGB8
pub fn decode(name: String, bytes: &[u8]) -> Result<DecodedImage> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::ImageLoad(format!("Failed to read {}: {}", name, e)))?
        .decode()
        .map_err(|e| Error::ImageLoad(format!("Failed to decode {}: {}", name, e)))?;

    let rgb = image.to_rgb8();
    Ok(DecodedImage {
        name,
        width: rgb.width(),
        height: rgb.height(),
        pixels: rgb.into_raw(),
    })
}
