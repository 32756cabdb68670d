//! Task identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a submitted task.
///
/// A queue hands ids out in strictly increasing order, so the id doubles as
/// the admission sequence number: among tasks of equal priority the smaller
/// id was added first and is dequeued first.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    /// Admission sequence number.
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}
