//! Inference execution for Model Bench
//!
//! This crate runs bounded detections of a loaded artifact against corpus
//! images and turns every outcome, failures included, into an image result.

pub mod corpus;
pub mod runner;

// Re-export commonly used types
pub use corpus::{image_name, FsImageLoader, ImageLoader};
pub use runner::InferenceRunner;
