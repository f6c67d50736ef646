//! Runtime resource accounting
//!
//! Every buffer the benchmark holds on the inference runtime (artifact
//! weights, warmup inputs) is represented by a [`TrackedResource`] guard.
//! Dropping the guard is the dispose operation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use common::models::MemorySnapshot;

/// View of the runtime's allocations used by reclamation
pub trait RuntimeMemory: Send + Sync {
    /// Current live resources
    fn snapshot(&self) -> MemorySnapshot;

    /// Frees resources whose owners already released them.
    ///
    /// Returns how many resources were freed by this call.
    fn release_unreferenced(&self) -> usize;
}

/// When a dropped resource leaves the live set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// On drop
    Immediate,
    /// On the next `release_unreferenced` call, like runtimes that free lazily
    Deferred,
}

#[derive(Debug)]
struct Allocation {
    label: String,
    bytes: u64,
    released: bool,
}

#[derive(Debug)]
struct TrackerInner {
    allocations: DashMap<u64, Allocation>,
    next_id: AtomicU64,
    mode: ReleaseMode,
}

impl TrackerInner {
    fn release(&self, id: u64) {
        match self.mode {
            ReleaseMode::Immediate => {
                if let Some((_, allocation)) = self.allocations.remove(&id) {
                    trace!("Released {} ({} bytes)", allocation.label, allocation.bytes);
                }
            }
            ReleaseMode::Deferred => {
                if let Some(mut allocation) = self.allocations.get_mut(&id) {
                    allocation.released = true;
                }
            }
        }
    }
}

/// In-process accounting of runtime allocations
#[derive(Debug, Clone)]
pub struct ResourceTracker {
    inner: Arc<TrackerInner>,
}

impl ResourceTracker {
    /// Creates a tracker that frees on drop
    pub fn new() -> Self {
        Self::with_mode(ReleaseMode::Immediate)
    }

    /// Creates a tracker with an explicit release mode
    pub fn with_mode(mode: ReleaseMode) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                allocations: DashMap::new(),
                next_id: AtomicU64::new(1),
                mode,
            }),
        }
    }

    /// Registers a live allocation of `bytes`
    pub fn allocate(&self, label: impl Into<String>, bytes: u64) -> TrackedResource {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let label = label.into();
        trace!("Allocated {} ({} bytes)", label, bytes);

        self.inner.allocations.insert(
            id,
            Allocation {
                label,
                bytes,
                released: false,
            },
        );

        TrackedResource {
            id,
            bytes,
            tracker: self.inner.clone(),
        }
    }

    /// Labels of every resource not yet freed
    pub fn live_labels(&self) -> Vec<String> {
        self.inner
            .allocations
            .iter()
            .map(|entry| entry.value().label.clone())
            .collect()
    }
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeMemory for ResourceTracker {
    fn snapshot(&self) -> MemorySnapshot {
        self.inner
            .allocations
            .iter()
            .fold(MemorySnapshot::default(), |mut snapshot, entry| {
                snapshot.live_resource_count += 1;
                snapshot.live_bytes += entry.value().bytes;
                snapshot
            })
    }

    fn release_unreferenced(&self) -> usize {
        let before = self.inner.allocations.len();
        self.inner.allocations.retain(|_, allocation| !allocation.released);
        before - self.inner.allocations.len()
    }
}

/// Guard for one runtime allocation; dropping it disposes the allocation
pub struct TrackedResource {
    id: u64,
    bytes: u64,
    tracker: Arc<TrackerInner>,
}

impl TrackedResource {
    /// Size of the allocation
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Explicit dispose; equivalent to dropping the guard
    pub fn dispose(self) {}
}

impl fmt::Debug for TrackedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedResource")
            .field("id", &self.id)
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl Drop for TrackedResource {
    fn drop(&mut self) {
        self.tracker.release(self.id);
    }
}
