//! Run-level counters shared between workers and the aggregator.

use crate::types::{RunSummary, TaskState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Progress of one pipeline run
pub(crate) struct PipelineRun {
    total: usize,
    duplicates: usize,
    collisions: usize,
    started_at: Instant,
    in_flight: AtomicUsize,
    done: AtomicUsize,
    skipped: AtomicUsize,
    unresolved: AtomicUsize,
    failed: AtomicUsize,
}

impl PipelineRun {
    pub(crate) fn new(total: usize, duplicates: usize, collisions: usize) -> Self {
        Self {
            total,
            duplicates,
            collisions,
            started_at: Instant::now(),
            in_flight: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            unresolved: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    /// A worker picked up an item
    pub(crate) fn item_started(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    /// A worker finished processing an item
    pub(crate) fn item_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Items currently being processed
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Count a terminal state, returning the number of completed items
    pub(crate) fn record(&self, state: TaskState) -> usize {
        let counter = match state {
            TaskState::Done => &self.done,
            TaskState::Skipped => &self.skipped,
            TaskState::Unresolved => &self.unresolved,
            TaskState::Failed => &self.failed,
            other => {
                tracing::error!(state = %other, "Non-terminal state reported as outcome");
                return self.completed();
            }
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.completed()
    }

    fn completed(&self) -> usize {
        self.done.load(Ordering::SeqCst)
            + self.skipped.load(Ordering::SeqCst)
            + self.unresolved.load(Ordering::SeqCst)
            + self.failed.load(Ordering::SeqCst)
    }

    pub(crate) fn summary(&self, not_started: usize, cancelled: bool) -> RunSummary {
        RunSummary {
            total: self.total,
            done: self.done.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            unresolved: self.unresolved.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            not_started,
            duplicates: self.duplicates,
            collisions: self.collisions,
            cancelled,
            elapsed: self.started_at.elapsed(),
        }
    }
}
