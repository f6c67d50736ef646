//! Progress reporting
//!
//! The orchestrator owns one [`ProgressSink`] and reports every state
//! change and every processed input to it.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use common::models::ArtifactVariant;

use crate::state::BenchmarkState;

/// Position of a run after one processed input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// Inputs processed so far across every artifact
    pub completed: usize,
    /// Tested artifacts times corpus size
    pub total_planned: usize,
    /// Artifact being tested
    pub artifact: ArtifactVariant,
    /// Input just processed
    pub image: String,
}

impl ProgressUpdate {
    /// Completed share in [0, 1]
    pub fn fraction(&self) -> f64 {
        if self.total_planned == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total_planned as f64
    }
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% - Testing {} on {}",
            self.fraction() * 100.0,
            self.artifact,
            self.image
        )
    }
}

/// Event delivered to a progress sink
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The run moved to a new state
    StateChanged {
        from: BenchmarkState,
        to: BenchmarkState,
    },
    /// One input was processed
    Progress(ProgressUpdate),
}

/// Receives progress events; must not block
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Forwards events to a channel; a closed receiver drops them
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(completed: usize) -> ProgressUpdate {
        ProgressUpdate {
            completed,
            total_planned: 80,
            artifact: ArtifactVariant::Small,
            image: "card1.png".into(),
        }
    }

    #[test]
    fn test_fraction() {
        assert_eq!(update(20).fraction(), 0.25);
        assert_eq!(update(20).to_string(), "25.0% - Testing yolo11n on card1.png");

        let empty = ProgressUpdate {
            total_planned: 0,
            ..update(0)
        };
        assert_eq!(empty.fraction(), 0.0);
    }

    #[test]
    fn test_channel_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelProgress::new(tx);

        sink.report(ProgressEvent::Progress(update(1)));
        assert_eq!(rx.try_recv().unwrap(), ProgressEvent::Progress(update(1)));

        drop(rx);
        sink.report(ProgressEvent::Progress(update(2)));
    }

    #[test]
    fn test_closure_sink() {
        let seen = parking_lot::Mutex::new(Vec::new());
        let sink = |event: ProgressEvent| seen.lock().push(event);

        sink.report(ProgressEvent::StateChanged {
            from: BenchmarkState::Idle,
            to: BenchmarkState::SelectingArtifacts,
        });
        assert_eq!(seen.lock().len(), 1);
    }
}
