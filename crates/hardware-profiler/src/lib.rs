//! Device capability classification for Model Bench
//!
//! This crate turns ambient device signals (reported memory, platform string)
//! into the capability profile that drives the benchmark's adaptive policy.

pub mod profiler;
pub mod signals;

// Re-export commonly used types
pub use profiler::CapabilityProfiler;
pub use signals::DeviceSignals;
