//! Ready-queue entries and their dispatch ordering

use chrono::{DateTime, Utc};

use crate::domain::{Priority, TaskId};

/// A runnable task waiting in the ready heap.
///
/// Ordering is priority rank ascending (CRITICAL first), then `created_at`
/// ascending, then submission sequence ascending, so `BinaryHeap::pop`
/// always yields the next task to dispatch.
#[derive(Debug, Clone)]
pub struct ReadyEntry {
    pub id: TaskId,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    /// Monotonic submission sequence; breaks exact created_at ties
    pub seq: u64,
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ReadyEntry {}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed on every key: the max-heap then pops the most urgent,
        // oldest, first-submitted entry.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
