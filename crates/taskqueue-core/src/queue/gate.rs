//! Concurrency gate: counts running tasks against the configured ceiling.

use tracing::warn;

/// Slot counter. Holds no queue of its own; the scheduler decides who gets
/// a slot after popping the pending store.
#[derive(Debug)]
pub(crate) struct ConcurrencyGate {
    limit: usize,
    running: usize,
}

impl ConcurrencyGate {
    pub(crate) fn new(limit: usize) -> Self {
        Self { limit, running: 0 }
    }

    /// Take a slot if one is free. No side effect on failure.
    pub(crate) fn try_acquire(&mut self) -> bool {
        if self.has_capacity() {
            self.running += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn has_capacity(&self) -> bool {
        self.running < self.limit
    }

    /// Give back a slot taken by `try_acquire`.
    pub(crate) fn release(&mut self) {
        if self.running == 0 {
            warn!(limit = self.limit, "ConcurrencyGate::release: no slot held");
            return;
        }
        self.running -= 1;
    }

    pub(crate) fn running(&self) -> usize {
        self.running
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }
}
