//! Batch accumulation state machine.
//!
//! A bounded buffer with a size/time dual trigger: a batch is flushed as
//! soon as it reaches the size threshold, and no record waits longer than
//! the max-wait duration. The accumulator holds no timer itself; it only
//! reports the armed deadline, and the owning pipeline task drives it from
//! its select loop, which serializes all mutation.

use std::time::Duration;

use tokio::time::Instant;

use crate::domain::ProofRecord;

/// Result of handing a record (or a requeued batch) to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Size threshold reached; the caller must flush now.
    Flush,
    /// First pending record; a max-wait deadline was armed.
    Armed,
    /// A deadline was already armed; nothing to do.
    Pending,
}

/// Pending records for one chain plus the dual-trigger bookkeeping.
#[derive(Debug)]
pub struct BatchAccumulator {
    pending: Vec<ProofRecord>,
    size_threshold: usize,
    max_wait: Duration,
    deadline: Option<Instant>,
}

impl BatchAccumulator {
    pub fn new(size_threshold: usize, max_wait: Duration) -> Self {
        Self {
            pending: Vec::new(),
            size_threshold: size_threshold.max(1),
            max_wait,
            deadline: None,
        }
    }

    /// Append one record and evaluate the triggers.
    pub fn add(&mut self, record: ProofRecord) -> AddOutcome {
        self.pending.push(record);
        self.evaluate()
    }

    /// Reinsert a failed batch ahead of anything accumulated since, then
    /// evaluate the triggers as for `add`. Relative order inside `records`
    /// and inside the newer pending tail are both preserved.
    pub fn requeue_front(&mut self, mut records: Vec<ProofRecord>) -> AddOutcome {
        if records.is_empty() {
            return AddOutcome::Pending;
        }
        records.append(&mut self.pending);
        self.pending = records;
        self.evaluate()
    }

    /// Atomically snapshot-and-clear the pending sequence and disarm the
    /// deadline. Called on either trigger and on shutdown flush.
    pub fn take_batch(&mut self) -> Vec<ProofRecord> {
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }

    /// Deadline of the armed max-wait timer, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn evaluate(&mut self) -> AddOutcome {
        if self.pending.len() >= self.size_threshold {
            self.deadline = None;
            return AddOutcome::Flush;
        }
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.max_wait);
            return AddOutcome::Armed;
        }
        AddOutcome::Pending
    }
}
