//! Summary persistence for Model Bench
//!
//! This crate flattens benchmark runs into summary records, writes export
//! documents and provides the telemetry stores summaries are persisted to.

pub mod record;
pub mod store;

// Re-export commonly used types
pub use record::{ExportDocument, SummaryRecord};
pub use store::{HttpTelemetryStore, InMemoryTelemetryStore, JsonLinesTelemetryStore, TelemetryStore};
