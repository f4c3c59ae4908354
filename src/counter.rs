use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Pending-work counters shared by producers, workers and consumers
///
/// Each counter is raised before the element it tracks becomes visible to
/// the other side and lowered again if the hand-off fails, so a reader never
/// observes a negative value.
#[derive(Debug, Default)]
pub struct Counters {
    pending_in: AtomicI64,
    pending_out: AtomicI64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr_in(&self) {
        self.pending_in.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decr_in(&self) {
        self.pending_in.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn incr_out(&self) {
        self.pending_out.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decr_out(&self) {
        self.pending_out.fetch_sub(1, Ordering::AcqRel);
    }

    /// Items enqueued but not yet taken into a batch
    pub fn pending_in(&self) -> i64 {
        self.pending_in.load(Ordering::Acquire)
    }

    /// Batches emitted but not yet acknowledged
    pub fn pending_out(&self) -> i64 {
        self.pending_out.load(Ordering::Acquire)
    }

    /// Read both counters, one after the other
    pub fn lag(&self) -> Lag {
        Lag {
            pending_in: self.pending_in(),
            pending_out: self.pending_out(),
        }
    }
}

/// A momentary reading of both counters
///
/// The two values are read separately and need not describe the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lag {
    pub pending_in: i64,
    pub pending_out: i64,
}

impl fmt::Display for Lag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in={} out={}", self.pending_in, self.pending_out)
    }
}
