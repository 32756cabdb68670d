//! Task state machine.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Pending -> Running -> Succeeded
/// - Pending -> Running -> Running (retry, slot kept) -> ...
/// - Pending -> Running -> Failed (retries exhausted)
///
/// A task that finds a free slot on `add` skips the wait but still passes
/// through `Pending` on paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting for a concurrency slot.
    Pending,

    /// Holding a slot; an attempt is in flight or a retry is about to start.
    Running,

    Succeeded,

    Failed,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}
