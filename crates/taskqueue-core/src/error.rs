//! Error types.
//!
//! - `TaskError<E>`: why a task settled in the failed state. `E` is the
//!   caller's own error type and is carried through untouched.
//! - `ConfigError`: malformed queue or task options, reported before any
//!   scheduler state changes.

use std::time::Duration;

use thiserror::Error;

/// Terminal failure of a task.
///
/// Only the error of the last attempt is reported; errors from attempts
/// that were retried are dropped.
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The attempt did not finish within the task's timeout.
    #[error("timeout: task did not finish within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The work itself returned an error. Displayed as-is; `source()` is
    /// `None`, so callers reach the value through `work()` / `into_work()`.
    #[error("{0}")]
    Work(E),

    /// The work panicked, either while building its future or while polling it.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task was dropped before it settled (runtime shutdown).
    #[error("task was abandoned before it settled")]
    Abandoned,
}

impl<E> TaskError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout(_))
    }

    /// Borrow the work error, if that is what failed the task.
    pub fn work(&self) -> Option<&E> {
        match self {
            TaskError::Work(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_work(self) -> Option<E> {
        match self {
            TaskError::Work(e) => Some(e),
            _ => None,
        }
    }
}

/// Rejected configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("invalid backoff: {0}")]
    InvalidBackoff(String),

    #[error("invalid queue config: {0}")]
    Parse(String),
}
