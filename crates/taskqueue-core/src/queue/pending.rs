//! Pending store: tasks waiting for a concurrency slot.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::ids::TaskId;

/// Heap entry keyed by `(priority desc, id asc)`.
///
/// `BinaryHeap` is a max-heap, so the greatest entry is the one to run next:
/// higher priority wins, and among equals the lower id (admitted earlier).
pub(crate) struct PendingEntry<J> {
    priority: i64,
    id: TaskId,
    job: J,
}

impl<J> PendingEntry<J> {
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn priority(&self) -> i64 {
        self.priority
    }

    pub(crate) fn into_job(self) -> J {
        self.job
    }
}

impl<J> PartialEq for PendingEntry<J> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.id == other.id
    }
}

impl<J> Eq for PendingEntry<J> {}

impl<J> PartialOrd for PendingEntry<J> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<J> Ord for PendingEntry<J> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            // Reverse on id: earlier admission sorts greater
            .then_with(|| other.id.cmp(&self.id))
    }
}

pub(crate) struct PendingStore<J> {
    heap: BinaryHeap<PendingEntry<J>>,
}

impl<J> PendingStore<J> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: TaskId, priority: i64, job: J) {
        self.heap.push(PendingEntry { priority, id, job });
    }

    pub(crate) fn pop_highest(&mut self) -> Option<PendingEntry<J>> {
        self.heap.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn drain(store: &mut PendingStore<&'static str>) -> Vec<&'static str> {
        std::iter::from_fn(|| store.pop_highest().map(PendingEntry::into_job)).collect()
    }

    #[test]
    fn empty_store_pops_none() {
        let mut store: PendingStore<()> = PendingStore::new();
        assert!(store.is_empty());
        assert!(store.pop_highest().is_none());
    }

    #[test]
    fn higher_priority_pops_first() {
        let mut store = PendingStore::new();
        store.insert(TaskId::new(1), 1, "low");
        store.insert(TaskId::new(2), 10, "high");
        store.insert(TaskId::new(3), 5, "mid");
        assert_eq!(store.len(), 3);
        assert_eq!(drain(&mut store), vec!["high", "mid", "low"]);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut store = PendingStore::new();
        for (seq, label) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
            store.insert(TaskId::new(seq), 0, label);
        }
        assert_eq!(drain(&mut store), vec!["a", "b", "c", "d"]);
    }

    #[rstest]
    #[case(&[(1, 0), (2, -5), (3, 0)], &[1, 3, 2])]
    #[case(&[(1, -1), (2, -1), (3, i64::MIN), (4, i64::MAX)], &[4, 1, 2, 3])]
    #[case(&[(5, 2), (6, 3), (7, 2), (8, 3)], &[6, 8, 5, 7])]
    fn orders_by_priority_then_sequence(#[case] input: &[(u64, i64)], #[case] expected: &[u64]) {
        let mut store = PendingStore::new();
        for &(seq, priority) in input {
            store.insert(TaskId::new(seq), priority, ());
        }
        let order: Vec<u64> = std::iter::from_fn(|| store.pop_highest())
            .map(|entry| entry.id().sequence())
            .collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn entry_exposes_key() {
        let mut store = PendingStore::new();
        store.insert(TaskId::new(9), 4, "x");
        let entry = store.pop_highest().unwrap();
        assert_eq!(entry.id(), TaskId::new(9));
        assert_eq!(entry.priority(), 4);
        assert_eq!(entry.into_job(), "x");
    }
}
