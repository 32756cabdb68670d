use serde::{Deserialize, Serialize};

/// Point-in-time counters of a `TaskQueue`.
///
/// `pending` and `running` are live gauges; the rest only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub concurrency: usize,
    pub pending: usize,
    pub running: usize,
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Attempts that failed and were retried.
    pub retried: u64,
    /// Attempts that hit their timeout, retried or not.
    pub timed_out: u64,
}

impl QueueStats {
    /// Tasks that reached a terminal state.
    pub fn settled(&self) -> u64 {
        self.succeeded + self.failed
    }
}
