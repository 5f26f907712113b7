//! Run-scoped counters and the summary reported at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use product_indexer_repository::BatchResult;
use uuid::Uuid;

/// Outcome counts of one `bulk_index` run.
///
/// Every pulled document ends up in exactly one bucket:
/// `attempted = succeeded + transformation_failures + write_failures + discarded`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexingSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Documents pulled from the stream, including those that failed to transform.
    pub attempted: u64,
    pub succeeded: u64,
    pub transformation_failures: u64,
    /// Documents the search index rejected individually.
    pub write_failures: u64,
    pub batches_written: u64,
    pub failed_batches: u64,
    /// Documents with no write outcome because their batch failed or was never sent.
    pub discarded: u64,
}

impl IndexingSummary {
    /// Everything that was attempted but did not succeed.
    pub fn failed(&self) -> u64 {
        self.attempted.saturating_sub(self.succeeded)
    }
}

/// Counters shared between the indexer and its batch write tasks.
#[derive(Debug)]
pub(crate) struct RunCounters {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    attempted: AtomicU64,
    succeeded: AtomicU64,
    transformation_failures: AtomicU64,
    write_failures: AtomicU64,
    batches_written: AtomicU64,
    failed_batches: AtomicU64,
    discarded: AtomicU64,
}

impl RunCounters {
    pub(crate) fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            attempted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            transformation_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            failed_batches: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub(crate) fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub(crate) fn record_pulled(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transformation_failure(&self) {
        self.transformation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for a written batch of `size` documents.
    ///
    /// Returns the number of documents counted as succeeded, which never exceeds `size`.
    pub(crate) fn record_batch(&self, size: usize, result: &BatchResult) -> u64 {
        let size = size as u64;
        let succeeded = (result.succeeded as u64).min(size);

        self.succeeded.fetch_add(succeeded, Ordering::Relaxed);
        self.write_failures
            .fetch_add(size - succeeded, Ordering::Relaxed);
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        succeeded
    }

    pub(crate) fn record_failed_batch(&self, size: usize) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.record_discarded(size);
    }

    pub(crate) fn record_discarded(&self, count: usize) {
        self.discarded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Copy the current counts into a summary.
    pub(crate) fn snapshot(&self, finished_at: Option<DateTime<Utc>>) -> IndexingSummary {
        IndexingSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at,
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            transformation_failures: self.transformation_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
