//! Artifact lifecycle management for Model Bench
//!
//! This crate acquires artifacts from a local repository or over HTTP,
//! warms them up on the inference runtime and hands out owned handles whose
//! disposal releases the runtime resources they hold.

pub mod downloader;
pub mod loader;
pub mod repository;
pub mod runtime;
pub mod source;

// Re-export commonly used types
pub use downloader::HttpArtifactSource;
pub use loader::{AcquiredArtifact, ArtifactHandle, ArtifactLoader};
pub use repository::DirectoryArtifactSource;
pub use runtime::{
    ArtifactDescriptor, DecodedImage, Detection, DetectionOutput, Detector, InputTensor, LoadedArtifact,
};
pub use source::{ArtifactManifest, ArtifactSource};
