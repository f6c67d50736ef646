//! Utility functions for Model Bench
//!
//! Formatting helpers and the deadline race every bounded collaborator call
//! goes through.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome of racing an operation against a deadline
#[derive(Debug, PartialEq, Eq)]
pub enum RaceOutcome<T> {
    /// The operation settled first
    Completed(T),
    /// The deadline fired first; the operation's token has been cancelled
    TimedOut,
    /// The token was cancelled from outside before either settled
    Cancelled,
}

impl<T> RaceOutcome<T> {
    /// Returns true if the deadline fired first
    pub fn is_timed_out(&self) -> bool {
        matches!(self, RaceOutcome::TimedOut)
    }
}

/// Races `future` against a timer of `limit`.
///
/// The future is polled first on every wake-up, so an operation that settles
/// before the deadline always wins. When the timer wins, `token` is cancelled
/// so the collaborator observing it stops its work, and the future is dropped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use common::utils::{race_deadline, RaceOutcome};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let token = CancellationToken::new();
/// let outcome = race_deadline(async { 42 }, Duration::from_secs(1), &token).await;
/// assert_eq!(outcome, RaceOutcome::Completed(42));
/// # }
/// ```
pub async fn race_deadline<T, F>(future: F, limit: Duration, token: &CancellationToken) -> RaceOutcome<T>
where
    F: Future<Output = T>,
{
    tokio::pin!(future);

    tokio::select! {
        biased;
        output = &mut future => RaceOutcome::Completed(output),
        _ = token.cancelled() => RaceOutcome::Cancelled,
        _ = tokio::time::sleep(limit) => {
            token.cancel();
            RaceOutcome::TimedOut
        }
    }
}

/// Milliseconds elapsed since `start`, with sub-millisecond precision
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Formats a byte size into a human-readable string
///
/// # Examples
///
/// ```
/// use common::utils::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    bytesize::ByteSize::b(bytes).to_string_as(true)
}

/// Formats a duration into a human-readable string
///
/// # Examples
///
/// ```
/// use common::utils::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
/// assert_eq!(format_duration(Duration::from_millis(200)), "200ms");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs == 0 {
        return format!("{}ms", duration.subsec_millis());
    }

    let minutes = total_secs / 60;
    let seconds = total_secs % 60;

    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Formats a float with two decimals, the precision of persisted summaries
pub fn format_fixed2(value: f64) -> String {
    format!("{:.2}", value)
}
