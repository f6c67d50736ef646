//! Memory reclamation
//!
//! A reclamation pass asks the runtime to free what is no longer
//! referenced, then yields scheduler turns so deferred frees can complete.
//! Low-end devices additionally back off for the profile's delay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use bench_config::ReclamationSettings;
use common::models::{CapabilityProfile, MemorySnapshot};
use common::utils::format_bytes;

use crate::tracker::RuntimeMemory;

/// Outcome of one reclamation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Live resources before the pass
    pub before: MemorySnapshot,
    /// Live resources after the pass
    pub after: MemorySnapshot,
    /// Resources freed by the pass
    pub released: usize,
    /// Scheduler turns yielded, extra turns included
    pub cycles: u32,
}

impl ReclaimReport {
    /// Returns true if live bytes exceed `budget_bytes` after the pass
    pub fn over_budget(&self, budget_bytes: u64) -> bool {
        self.after.live_bytes > budget_bytes
    }
}

/// Runs reclamation passes against the runtime's memory
pub struct ReclamationCoordinator {
    /// Runtime view
    memory: Arc<dyn RuntimeMemory>,

    /// Yield policy
    settings: ReclamationSettings,

    /// Passes performed so far
    passes: AtomicU64,
}

impl ReclamationCoordinator {
    /// Creates a coordinator over `memory`
    pub fn new(memory: Arc<dyn RuntimeMemory>, settings: ReclamationSettings) -> Self {
        Self {
            memory,
            settings,
            passes: AtomicU64::new(0),
        }
    }

    /// Current live resources
    pub fn snapshot(&self) -> MemorySnapshot {
        self.memory.snapshot()
    }

    /// Number of passes performed so far
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Performs one reclamation pass for `profile`. Never fails.
    pub async fn reclaim(&self, profile: &CapabilityProfile) -> ReclaimReport {
        self.passes.fetch_add(1, Ordering::Relaxed);

        let before = self.memory.snapshot();
        let mut released = self.memory.release_unreferenced();

        let base_cycles = if profile.ios_like {
            self.settings.ios_yield_cycles
        } else {
            self.settings.yield_cycles
        };

        let mut cycles = 0;
        for _ in 0..base_cycles {
            tokio::task::yield_now().await;
            released += self.memory.release_unreferenced();
            cycles += 1;
        }

        // Extra turns while the runtime still holds too many resources
        let mut extra = 0;
        while extra < self.settings.extra_cycles
            && self.memory.snapshot().live_resource_count > self.settings.watermark
        {
            tokio::task::yield_now().await;
            released += self.memory.release_unreferenced();
            extra += 1;
        }
        cycles += extra;

        if profile.low_end {
            tokio::time::sleep(profile.reclamation_delay()).await;
        }

        let after = self.memory.snapshot();
        debug!(
            "Reclamation pass: {} -> {}, released {}, {} cycles",
            before, after, released, cycles
        );

        let report = ReclaimReport {
            before,
            after,
            released,
            cycles,
        };

        if report.over_budget(profile.max_memory_budget_bytes) {
            warn!(
                "Live memory {} exceeds budget {}",
                format_bytes(after.live_bytes),
                format_bytes(profile.max_memory_budget_bytes)
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::tracker::{ReleaseMode, ResourceTracker};

    fn profile(low_end: bool, ios_like: bool) -> CapabilityProfile {
        CapabilityProfile {
            device_memory_gb: if low_end { 2.0 } else { 16.0 },
            low_end,
            ios_like,
            max_memory_budget_bytes: 1024,
            reclamation_delay_ms: if ios_like { 2000 } else { 1000 },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_desktop_pass_has_no_delay() {
        let tracker = ResourceTracker::with_mode(ReleaseMode::Deferred);
        let released = tracker.allocate("old weights", 512);
        let _live = tracker.allocate("input", 16);
        drop(released);

        let coordinator = ReclamationCoordinator::new(Arc::new(tracker.clone()), ReclamationSettings::default());
        let start = tokio::time::Instant::now();
        let report = coordinator.reclaim(&profile(false, false)).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(report.released, 1);
        assert_eq!(report.cycles, 4);
        assert_eq!(report.after.live_resource_count, 1);
        assert_eq!(coordinator.passes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_end_pass_waits_for_delay() {
        let coordinator =
            ReclamationCoordinator::new(Arc::new(ResourceTracker::new()), ReclamationSettings::default());

        let start = tokio::time::Instant::now();
        let report = coordinator.reclaim(&profile(true, true)).await;

        assert_eq!(start.elapsed(), Duration::from_millis(2000));
        assert_eq!(report.cycles, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_cycles_above_watermark() {
        let tracker = ResourceTracker::new();
        let _held: Vec<_> = (0..25).map(|i| tracker.allocate(format!("tensor {}", i), 1)).collect();

        let coordinator = ReclamationCoordinator::new(Arc::new(tracker), ReclamationSettings::default());
        let report = coordinator.reclaim(&profile(false, false)).await;

        assert_eq!(report.cycles, 4 + 3);
        assert_eq!(report.after.live_resource_count, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_budget_reported() {
        let tracker = ResourceTracker::new();
        let _weights = tracker.allocate("weights", 4096);

        let coordinator = ReclamationCoordinator::new(Arc::new(tracker), ReclamationSettings::default());
        let report = coordinator.reclaim(&profile(false, false)).await;

        assert!(report.over_budget(1024));
        assert!(!report.over_budget(8192));
    }
}
