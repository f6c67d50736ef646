//! Error types for the common crate
//!
//! This module defines the error taxonomy shared by every Model Bench crate.
//! Benchmark failures are captured as data by the orchestrator; these errors
//! travel between components before that capture happens.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::format_duration;

/// Result type for Model Bench operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Model Bench operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Artifact acquisition (or its warmup) did not settle in time
    #[error("Loading timeout: {model_id} not ready after {}", format_duration(*.timeout))]
    LoadTimeout {
        /// Artifact identifier
        model_id: String,
        /// The bound that was exceeded
        timeout: Duration,
    },

    /// A single detection did not settle in time
    #[error("Detection timeout after {}", format_duration(*.0))]
    DetectionTimeout(Duration),

    /// A corpus item could not be read or decoded
    #[error("Image load failure: {0}")]
    ImageLoad(String),

    /// The runtime ran out of memory
    #[error("Out of memory: {0}")]
    MemoryExhaustion(String),

    /// Any other artifact load or run failure
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Telemetry write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Operation was cancelled through its token
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A benchmark run is already in progress
    #[error("A benchmark run is already in progress")]
    AlreadyRunning,

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failure classes recorded in benchmark results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Acquisition exceeded its bound; artifact failed, run continues
    LoadTimeout,
    /// One detection exceeded its bound; image failed, artifact continues
    DetectionTimeout,
    /// Corpus item undecodable; image failed, artifact continues
    ImageLoadFailure,
    /// Runtime memory exhausted; aborts the run on the heaviest artifact
    MemoryExhaustion,
    /// Any other load or run failure
    GenericArtifactError,
    /// Telemetry write failed; logged only
    PersistenceFailure,
}

impl Error {
    /// Wraps a transport or runtime failure as an artifact error
    pub fn artifact(message: impl Into<String>) -> Self {
        Error::Artifact(message.into())
    }

    /// Returns true if the error is any kind of timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::LoadTimeout { .. } | Error::DetectionTimeout(_))
    }

    /// Returns true if the error was raised by cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// Maps the error onto the benchmark failure taxonomy.
    ///
    /// Errors that never occur inside a benchmark step (configuration,
    /// re-entrancy) have no failure class.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Error::LoadTimeout { .. } => Some(FailureKind::LoadTimeout),
            Error::DetectionTimeout(_) => Some(FailureKind::DetectionTimeout),
            Error::ImageLoad(_) => Some(FailureKind::ImageLoadFailure),
            Error::MemoryExhaustion(_) => Some(FailureKind::MemoryExhaustion),
            Error::Persistence(_) => Some(FailureKind::PersistenceFailure),
            Error::Artifact(_) | Error::Io(_) | Error::Serialization(_) | Error::Cancelled(_) => {
                Some(FailureKind::GenericArtifactError)
            }
            Error::Config(_) | Error::AlreadyRunning | Error::InvalidArgument(_) => None,
        }
    }
}
