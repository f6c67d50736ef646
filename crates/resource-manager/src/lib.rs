//! Runtime resource management for Model Bench
//!
//! This crate accounts for the buffers the benchmark holds on the inference
//! runtime and runs the reclamation passes that release them between
//! batches and artifacts.

mod reclamation;
mod tracker;

pub use reclamation::{ReclaimReport, ReclamationCoordinator};
pub use tracker::{ReleaseMode, ResourceTracker, RuntimeMemory, TrackedResource};
