//! Lifecycle management for benchmark runs
//!
//! Tracks the current state and keeps runs from overlapping: a run holds a
//! [`RunGuard`] from selection until its terminal state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use common::error::{Error, Result};

use crate::state::BenchmarkState;

/// Lifecycle manager for the orchestrator
#[derive(Debug, Default)]
pub struct RunLifecycle {
    /// Current state
    state: RwLock<BenchmarkState>,

    /// Set while a run is in progress
    running: Arc<AtomicBool>,
}

impl RunLifecycle {
    /// Creates an idle lifecycle
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> BenchmarkState {
        self.state.read().clone()
    }

    /// Returns true while a run holds the guard
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claims the lifecycle for one run
    pub fn try_begin(&self) -> Result<RunGuard> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Rejected benchmark start: a run is already in progress");
            return Err(Error::AlreadyRunning);
        }

        debug!("Run exclusion acquired");
        Ok(RunGuard {
            running: self.running.clone(),
        })
    }

    /// Transitions to `next`, returning the previous state
    pub fn transition_to(&self, next: BenchmarkState) -> BenchmarkState {
        let mut state = self.state.write();

        if !state.can_transition_to(&next) {
            warn!("Unexpected state transition: {} -> {}", *state, next);
        }

        info!("State transition: {} -> {}", *state, next);
        std::mem::replace(&mut *state, next)
    }
}

/// Exclusion held by a run; released on drop
#[derive(Debug)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        debug!("Run exclusion released");
    }
}
