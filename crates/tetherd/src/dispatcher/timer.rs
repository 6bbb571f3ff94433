//! Delayed events ordered by deadline.

use std::cmp::Ordering;
use std::time::Instant;

use super::Event;

/// Event scheduled to become ready at `deadline`.
///
/// Ordering is reversed so that `BinaryHeap` yields the earliest deadline
/// first; `sequence` breaks ties in posting order.
pub(super) struct Timer<C> {
    pub(super) deadline: Instant,
    pub(super) sequence: u64,
    pub(super) event: Event<C>,
}

impl<C> PartialEq for Timer<C> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl<C> Eq for Timer<C> {}

impl<C> PartialOrd for Timer<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Timer<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}
