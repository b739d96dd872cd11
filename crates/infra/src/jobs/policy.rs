//! Polling policy for in-flight generation jobs.

use std::time::Duration;

/// Timing rules applied by every polling task.
///
/// - `interval`: fixed sleep before each poll
/// - `max_duration`: ceiling on total elapsed polling time
/// - `transient_window`: transient upstream errors are tolerated only while
///   elapsed time is below this window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_duration: Duration,
    pub transient_window: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_duration: Duration::from_secs(600),
            transient_window: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    /// Policy with a custom interval and the default ceilings.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Whether another poll may start after `elapsed`.
    pub fn within_ceiling(&self, elapsed: Duration) -> bool {
        elapsed < self.max_duration
    }

    /// Whether a transient failure observed at `elapsed` may be retried.
    pub fn may_retry_transient(&self, elapsed: Duration) -> bool {
        elapsed < self.transient_window
    }
}
