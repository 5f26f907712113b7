//! Bulk indexing engine.
//!
//! The [`Indexer`] prepares the target index and then streams documents into it
//! in fixed-size batches, keeping at most `max_in_flight_batches` bulk writes
//! outstanding. Batches complete in submission order, so progress is reported
//! in document order.

mod summary;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesOrdered, Stream, StreamExt};
use product_indexer_repository::{BatchResult, IndexRepository, SearchIndexError};
use product_indexer_shared::IndexableDocument;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{BulkIndexError, IndexerError};
use crate::pipeline::TransformationError;

pub use summary::IndexingSummary;
use summary::RunCounters;

/// Default number of documents per bulk request.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Configuration for the indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Number of documents per bulk request.
    pub batch_size: usize,
    /// Maximum number of bulk requests outstanding at once.
    pub max_in_flight_batches: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight_batches: 1,
        }
    }
}

impl IndexerConfig {
    fn validate(&self) -> Result<(), IndexerError> {
        if self.batch_size == 0 {
            return Err(IndexerError::config("batch_size must be greater than 0"));
        }
        if self.max_in_flight_batches == 0 {
            return Err(IndexerError::config(
                "max_in_flight_batches must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Lifecycle of an [`Indexer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerState {
    Idle,
    IndexReady,
    Streaming,
    Finished,
    Failed,
}

impl fmt::Display for IndexerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::IndexReady => "index ready",
            Self::Streaming => "streaming",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Bulk writes that have been submitted but not yet reported.
///
/// `pending` mirrors `handles` so a batch's size is known even if its task panics.
/// Dropping the set aborts every write still outstanding.
struct InFlight {
    handles: FuturesOrdered<JoinHandle<Result<BatchResult, SearchIndexError>>>,
    pending: VecDeque<(usize, AbortHandle)>,
}

impl InFlight {
    fn new() -> Self {
        Self {
            handles: FuturesOrdered::new(),
            pending: VecDeque::new(),
        }
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    fn push(&mut self, size: usize, handle: JoinHandle<Result<BatchResult, SearchIndexError>>) {
        self.pending.push_back((size, handle.abort_handle()));
        self.handles.push_back(handle);
    }

    /// Wait for the oldest batch.
    async fn next(&mut self) -> Option<(usize, Result<BatchResult, SearchIndexError>)> {
        let joined = self.handles.next().await?;
        let size = self
            .pending
            .pop_front()
            .map(|(size, _)| size)
            .unwrap_or_default();
        let result = joined.unwrap_or_else(|e| {
            Err(SearchIndexError::transport(format!(
                "Bulk write task failed: {}",
                e
            )))
        });
        Some((size, result))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        for (_, handle) in &self.pending {
            handle.abort();
        }
    }
}

/// Leaves `Streaming` when a run ends.
///
/// A run whose future is dropped before completion never sets an outcome and
/// ends in `Failed`, so the index can be prepared again.
struct RunGuard<'a> {
    state: &'a mut IndexerState,
    outcome: Option<IndexerState>,
}

impl<'a> RunGuard<'a> {
    fn start(state: &'a mut IndexerState) -> Self {
        *state = IndexerState::Streaming;
        Self {
            state,
            outcome: None,
        }
    }

    fn finish(mut self, outcome: IndexerState) {
        self.outcome = Some(outcome);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.state = self.outcome.unwrap_or_else(|| {
            warn!("Bulk indexing run cancelled before completion");
            IndexerState::Failed
        });
    }
}

/// Drives index preparation and batched bulk writes against an [`IndexRepository`].
pub struct Indexer {
    repository: Arc<dyn IndexRepository>,
    config: IndexerConfig,
    state: IndexerState,
}

impl Indexer {
    /// Create a new indexer.
    ///
    /// # Returns
    ///
    /// * `Err(IndexerError::InvalidConfig)` - If the batch size or in-flight limit is zero
    pub fn new(
        repository: Arc<dyn IndexRepository>,
        config: IndexerConfig,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        Ok(Self {
            repository,
            config,
            state: IndexerState::Idle,
        })
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    /// Prepare the target index.
    ///
    /// With `delete_if_exists` the index is dropped and created again. Otherwise an
    /// existing index is kept as is and a missing one is created.
    #[instrument(skip(self), fields(index = %self.repository.index_name()))]
    pub async fn create_index(&mut self, delete_if_exists: bool) -> Result<(), IndexerError> {
        if self.state == IndexerState::Streaming {
            return Err(IndexerError::InvalidState {
                operation: "create the index",
                state: self.state,
            });
        }

        match self.prepare_index(delete_if_exists).await {
            Ok(()) => {
                self.state = IndexerState::IndexReady;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to prepare index");
                self.state = IndexerState::Failed;
                Err(IndexerError::IndexCreation(e))
            }
        }
    }

    async fn prepare_index(&self, delete_if_exists: bool) -> Result<(), SearchIndexError> {
        if delete_if_exists {
            self.repository.delete_index().await?;
            return self.repository.create_index().await;
        }

        if self.repository.index_exists().await? {
            info!("Index already exists, keeping it");
            return Ok(());
        }
        self.repository.create_index().await
    }

    /// Write every document of the stream to the index.
    ///
    /// `on_progress` is called once per pulled item: immediately for a transformation
    /// failure, and once per document of a batch after that batch is written. Documents
    /// the index rejects individually are counted as write failures and do not stop
    /// the run.
    ///
    /// Dropping the returned future aborts outstanding writes and leaves the indexer
    /// in `Failed`.
    ///
    /// # Returns
    ///
    /// * `Ok(IndexingSummary)` - When the stream is exhausted
    /// * `Err(IndexerError::InvalidState)` - If the index has not been prepared
    /// * `Err(IndexerError::BulkIndex)` - If a batch failed as a whole. No more documents
    ///   are pulled, in-flight batches drain and the error carries the final counts.
    #[instrument(
        skip_all,
        fields(index = %self.repository.index_name(), batch_size = self.config.batch_size)
    )]
    pub async fn bulk_index<S, F>(
        &mut self,
        documents: S,
        mut on_progress: F,
    ) -> Result<IndexingSummary, IndexerError>
    where
        S: Stream<Item = Result<IndexableDocument, TransformationError>>,
        F: FnMut(),
    {
        if self.state != IndexerState::IndexReady {
            return Err(IndexerError::InvalidState {
                operation: "bulk index",
                state: self.state,
            });
        }
        let run = RunGuard::start(&mut self.state);

        let counters = Arc::new(RunCounters::start());
        info!(run_id = %counters.run_id(), "Starting bulk indexing run");

        futures::pin_mut!(documents);
        let batch_size = self.config.batch_size;
        let mut batch: Vec<IndexableDocument> = Vec::with_capacity(batch_size);
        let mut in_flight = InFlight::new();
        let mut failure: Option<SearchIndexError> = None;

        while failure.is_none() {
            let Some(item) = documents.next().await else {
                break;
            };
            counters.record_pulled();

            match item {
                Ok(doc) => batch.push(doc),
                Err(e) => {
                    warn!(
                        stage = %e.stage,
                        record = %e.record,
                        error = %e.source,
                        "Skipping record"
                    );
                    counters.record_transformation_failure();
                    on_progress();
                }
            }

            if batch.len() >= batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                Self::submit(&self.repository, &mut in_flight, full, &counters);
            }

            while in_flight.len() >= self.config.max_in_flight_batches {
                match in_flight.next().await {
                    Some(completed) => {
                        Self::report(completed, &counters, &mut on_progress, &mut failure)
                    }
                    None => break,
                }
            }
        }

        if failure.is_none() && !batch.is_empty() {
            let last = std::mem::take(&mut batch);
            Self::submit(&self.repository, &mut in_flight, last, &counters);
        } else if !batch.is_empty() {
            counters.record_discarded(batch.len());
        }

        while let Some(completed) = in_flight.next().await {
            Self::report(completed, &counters, &mut on_progress, &mut failure);
        }

        let summary = counters.snapshot(Some(Utc::now()));
        match failure {
            None => {
                run.finish(IndexerState::Finished);
                info!(
                    attempted = summary.attempted,
                    succeeded = summary.succeeded,
                    transformation_failures = summary.transformation_failures,
                    write_failures = summary.write_failures,
                    batches = summary.batches_written,
                    "Bulk indexing run finished"
                );
                Ok(summary)
            }
            Some(source) => {
                run.finish(IndexerState::Failed);
                error!(
                    attempted = summary.attempted,
                    succeeded = summary.succeeded,
                    failed_batches = summary.failed_batches,
                    discarded = summary.discarded,
                    error = %source,
                    "Bulk indexing run failed"
                );
                Err(BulkIndexError { summary, source }.into())
            }
        }
    }

    /// Spawn the bulk write for one batch.
    fn submit(
        repository: &Arc<dyn IndexRepository>,
        in_flight: &mut InFlight,
        batch: Vec<IndexableDocument>,
        counters: &Arc<RunCounters>,
    ) {
        let size = batch.len();
        let repository = Arc::clone(repository);
        let counters = Arc::clone(counters);

        let handle = tokio::spawn(async move {
            let result = repository.bulk_write(&batch).await;
            if let Ok(written) = &result {
                counters.record_batch(size, written);
            }
            result
        });
        in_flight.push(size, handle);
    }

    /// Handle a completed batch: notify progress, or remember the first failure.
    fn report<F: FnMut()>(
        (size, result): (usize, Result<BatchResult, SearchIndexError>),
        counters: &RunCounters,
        on_progress: &mut F,
        failure: &mut Option<SearchIndexError>,
    ) {
        match result {
            Ok(batch) => {
                if !batch.failures.is_empty() {
                    warn!(
                        failed = batch.failed(),
                        first_id = %batch.failures[0].document_id,
                        first_error = %batch.failures[0].error,
                        "Batch written with rejected documents"
                    );
                }
                debug!(
                    size,
                    succeeded = batch.succeeded,
                    total_succeeded = counters.succeeded(),
                    "Batch written"
                );
                for _ in 0..size {
                    on_progress();
                }
            }
            Err(e) => {
                error!(
                    size,
                    transport = e.is_transport(),
                    error = %e,
                    "Batch write failed"
                );
                counters.record_failed_batch(size);
                if failure.is_none() {
                    *failure = Some(e);
                }
            }
        }
    }
}
