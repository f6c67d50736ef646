//! Benchmark run orchestration for Model Bench
//!
//! Drives artifact selection, loading, inference, aggregation, cleanup and
//! persistence for one benchmark run at a time.

pub mod classifier;
pub mod engine;
pub mod lifecycle;
pub mod metrics;
pub mod progress;
pub mod selection;
pub mod state;

// Re-export commonly used types
pub use classifier::{FailureClassifier, KeywordClassifier};
pub use engine::{BenchmarkOrchestrator, Collaborators, RunOutcome};
pub use lifecycle::{RunGuard, RunLifecycle};
pub use metrics::{aggregate, reaggregate, Aggregates};
pub use progress::{ChannelProgress, NoopProgress, ProgressEvent, ProgressSink, ProgressUpdate};
pub use selection::{select, SelectionPlan};
pub use state::{BenchmarkState, CANCELLED_REASON};
