//! Common utilities and types for Model Bench
//!
//! This crate provides shared functionality used across the benchmark engine,
//! including the error taxonomy, the result data model and timing helpers.

pub mod error;
pub mod models;
pub mod utils;

// Re-export commonly used types
pub use error::{Error, FailureKind, Result};
pub use models::*;
