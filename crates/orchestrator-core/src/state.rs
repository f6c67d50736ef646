//! State management for the benchmark orchestrator
//!
//! One run walks `Idle -> SelectingArtifacts`, then for every artifact
//! `Preparing -> Loading -> Warming -> TestingImages -> Aggregating ->
//! CleaningUp`, then `Persisting` and finally `Done` or `Aborted`.
//!
//! `Aborted` has two causes: memory exhaustion while loading the heaviest
//! artifact, or cancellation of the run token. A cancelled run carries
//! [`CANCELLED_REASON`] and is persisted like any other.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Abort reason recorded when the run token is cancelled
pub const CANCELLED_REASON: &str = "Run cancelled";

/// Represents the current state of a benchmark run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenchmarkState {
    /// No run has started
    Idle,

    /// Choosing which artifacts to test
    SelectingArtifacts,

    /// Reclaiming before the next artifact
    Preparing,

    /// Acquiring an artifact
    Loading,

    /// Running the warmup inference
    Warming,

    /// Running the corpus through the artifact
    TestingImages,

    /// Computing the artifact's summary
    Aggregating,

    /// Disposing the artifact and reclaiming
    CleaningUp,

    /// Writing the summary record
    Persisting,

    /// The run completed
    Done,

    /// The run stopped early, after memory exhaustion on the heaviest
    /// artifact or cancellation with [`CANCELLED_REASON`]
    Aborted(String),
}

impl BenchmarkState {
    /// Creates the initial state
    pub fn new() -> Self {
        BenchmarkState::Idle
    }

    /// Returns true if no run has started yet
    pub fn is_idle(&self) -> bool {
        matches!(self, BenchmarkState::Idle)
    }

    /// Returns true if the run completed
    pub fn is_done(&self) -> bool {
        matches!(self, BenchmarkState::Done)
    }

    /// Returns true if the run stopped early
    pub fn is_aborted(&self) -> bool {
        matches!(self, BenchmarkState::Aborted(_))
    }

    /// Returns true for `Done` and `Aborted`
    pub fn is_terminal(&self) -> bool {
        self.is_done() || self.is_aborted()
    }

    /// Returns true while a run is between selection and its terminal state
    pub fn is_active(&self) -> bool {
        !self.is_idle() && !self.is_terminal()
    }

    /// Returns true if the run stopped because its token was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.abort_reason() == Some(CANCELLED_REASON)
    }

    /// Gets the abort reason if aborted
    pub fn abort_reason(&self) -> Option<&str> {
        match self {
            BenchmarkState::Aborted(reason) => Some(reason),
            _ => None,
        }
    }

    /// Returns true if the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: &BenchmarkState) -> bool {
        use BenchmarkState::*;

        match (self, next) {
            (Idle | Done | Aborted(_), SelectingArtifacts) => true,
            (SelectingArtifacts, Preparing | Persisting) => true,
            (Preparing, Loading) => true,
            // Failed loads move on to the next artifact or stop the run
            (Loading, Warming | Preparing | Persisting) => true,
            (Warming, TestingImages | Preparing | Persisting) => true,
            (TestingImages, Aggregating) => true,
            (Aggregating, CleaningUp) => true,
            (CleaningUp, Preparing | Persisting) => true,
            (Persisting, Done | Aborted(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BenchmarkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchmarkState::Idle => write!(f, "Idle"),
            BenchmarkState::SelectingArtifacts => write!(f, "Selecting artifacts"),
            BenchmarkState::Preparing => write!(f, "Preparing"),
            BenchmarkState::Loading => write!(f, "Loading"),
            BenchmarkState::Warming => write!(f, "Warming"),
            BenchmarkState::TestingImages => write!(f, "Testing images"),
            BenchmarkState::Aggregating => write!(f, "Aggregating"),
            BenchmarkState::CleaningUp => write!(f, "Cleaning up"),
            BenchmarkState::Persisting => write!(f, "Persisting"),
            BenchmarkState::Done => write!(f, "Done"),
            BenchmarkState::Aborted(reason) => write!(f, "Aborted: {}", reason),
        }
    }
}

impl Default for BenchmarkState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_methods() {
        let idle = BenchmarkState::Idle;
        assert!(idle.is_idle());
        assert!(!idle.is_active());
        assert!(!idle.is_terminal());

        let testing = BenchmarkState::TestingImages;
        assert!(testing.is_active());
        assert_eq!(testing.abort_reason(), None);

        let aborted = BenchmarkState::Aborted("Out of memory".to_string());
        assert!(aborted.is_terminal());
        assert!(!aborted.is_active());
        assert_eq!(aborted.abort_reason(), Some("Out of memory"));
        assert!(!aborted.is_cancelled());

        let cancelled = BenchmarkState::Aborted(CANCELLED_REASON.to_string());
        assert!(cancelled.is_aborted());
        assert!(cancelled.is_cancelled());
        assert!(!BenchmarkState::Done.is_cancelled());
    }

    #[test]
    fn test_transitions() {
        use BenchmarkState::*;

        let cycle = [
            Idle,
            SelectingArtifacts,
            Preparing,
            Loading,
            Warming,
            TestingImages,
            Aggregating,
            CleaningUp,
            Persisting,
            Done,
        ];
        for pair in cycle.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
        }

        assert!(Loading.can_transition_to(&Preparing));
        assert!(Persisting.can_transition_to(&Aborted("x".into())));
        assert!(Done.can_transition_to(&SelectingArtifacts));

        assert!(!Idle.can_transition_to(&Loading));
        assert!(!TestingImages.can_transition_to(&Persisting));
        assert!(!Done.can_transition_to(&Done));
    }

    #[test]
    fn test_display() {
        assert_eq!(BenchmarkState::TestingImages.to_string(), "Testing images");
        assert_eq!(BenchmarkState::Aborted("Out of memory".into()).to_string(), "Aborted: Out of memory");
    }

    #[test]
    fn test_default() {
        assert_eq!(BenchmarkState::default(), BenchmarkState::Idle);
    }
}
