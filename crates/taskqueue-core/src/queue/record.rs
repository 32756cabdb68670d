//! Task record: work + scheduling metadata.

use std::time::{Duration, Instant};

use super::{RetryPolicy, TaskState};
use crate::config::TaskOptions;
use crate::ids::TaskId;

/// One submitted task.
///
/// Owned by exactly one place at a time: the pending store while it waits,
/// then the driver future while it runs. All state transitions happen here.
pub(crate) struct TaskRecord<F> {
    pub id: TaskId,
    pub priority: i64,
    pub state: TaskState,

    /// Called once per attempt.
    pub work: F,

    /// Extra attempts allowed after the first failure.
    pub retries: u32,

    pub timeout: Option<Duration>,
    pub backoff: RetryPolicy,

    /// Failed attempts so far.
    pub attempts: u32,

    /// How many of those failures were timeouts.
    pub timeouts: u32,

    /// Timestamps for observability.
    pub created_at: Instant,
    pub started_at: Option<Instant>,
}

impl<F> TaskRecord<F> {
    pub fn new(id: TaskId, work: F, options: TaskOptions) -> Self {
        Self {
            id,
            priority: options.priority,
            state: TaskState::Pending,
            work,
            retries: options.retries,
            timeout: options.timeout,
            backoff: options.backoff.unwrap_or_default(),
            attempts: 0,
            timeouts: 0,
            created_at: Instant::now(),
            started_at: None,
        }
    }

    /// Mark as running (slot granted).
    pub fn start(&mut self) {
        self.state = TaskState::Running;
        self.started_at.get_or_insert_with(Instant::now);
    }

    /// Count a failed attempt and return the new total.
    pub fn record_failure(&mut self, timed_out: bool) -> u32 {
        if timed_out {
            self.timeouts = self.timeouts.saturating_add(1);
        }
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub fn mark_succeeded(&mut self) {
        self.state = TaskState::Succeeded;
    }

    pub fn mark_failed(&mut self) {
        self.state = TaskState::Failed;
    }

    /// Time spent waiting for a slot.
    pub fn queued_for(&self) -> Duration {
        self.started_at
            .map(|started| started.duration_since(self.created_at))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_takes_options() {
        let opts = TaskOptions::new().priority(3).retries(2).timeout_ms(10);
        let record = TaskRecord::new(TaskId::new(1), (), opts);
        assert_eq!(record.state, TaskState::Pending);
        assert_eq!(record.priority, 3);
        assert_eq!(record.retries, 2);
        assert_eq!(record.timeout, Some(Duration::from_millis(10)));
        assert_eq!(record.backoff, RetryPolicy::immediate());
        assert_eq!(record.attempts, 0);
        assert_eq!(record.queued_for(), Duration::ZERO);
    }

    #[test]
    fn lifecycle_transitions() {
        let mut record = TaskRecord::new(TaskId::new(1), (), TaskOptions::default());
        record.start();
        assert_eq!(record.state, TaskState::Running);
        let first_start = record.started_at;
        assert!(first_start.is_some());

        assert_eq!(record.record_failure(false), 1);
        record.start();
        assert_eq!(record.started_at, first_start);
        assert_eq!(record.record_failure(true), 2);
        assert_eq!(record.timeouts, 1);

        record.mark_failed();
        assert!(record.state.is_terminal());
    }
}
