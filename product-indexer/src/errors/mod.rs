//! Error types for the product indexer.

use product_indexer_repository::SearchIndexError;
use product_indexer_shared::RecordError;
use thiserror::Error;

use crate::indexer::{IndexerState, IndexingSummary};
use crate::pipeline::PipelineError;

/// Errors raised while reading the record source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The source could not be opened or read.
    #[error("I/O error: {0}")]
    Io(String),

    /// A line could not be turned into a record.
    #[error(transparent)]
    Record(#[from] RecordError),
}

impl SourceError {
    /// Create an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// A batch failed as a whole and the run stopped.
///
/// Carries the counts accumulated up to the failure, once in-flight batches drained.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "Bulk indexing stopped with {} of {} documents indexed: {source}",
    .summary.succeeded,
    .summary.attempted
)]
pub struct BulkIndexError {
    pub summary: IndexingSummary,
    #[source]
    pub source: SearchIndexError,
}

/// Errors raised by the [`Indexer`](crate::indexer::Indexer).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexerError {
    #[error("Invalid indexer configuration: {0}")]
    InvalidConfig(String),

    /// The operation is not allowed in the indexer's current state.
    #[error("Cannot {operation} while the indexer is {state}")]
    InvalidState {
        operation: &'static str,
        state: IndexerState,
    },

    #[error("Index creation failed: {0}")]
    IndexCreation(#[source] SearchIndexError),

    #[error(transparent)]
    BulkIndex(#[from] BulkIndexError),
}

impl IndexerError {
    /// Create an invalid configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Counts of the run, if the error happened while streaming.
    pub fn summary(&self) -> Option<&IndexingSummary> {
        match self {
            Self::BulkIndex(e) => Some(&e.summary),
            _ => None,
        }
    }
}

/// Errors that can occur in an ingest run.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The record source could not be opened.
    #[error("Source error: {0}")]
    SourceError(#[from] SourceError),

    /// The record source failed mid-run; the run stopped pulling records.
    #[error(
        "Source failed after {} of {} documents indexed: {source}",
        .summary.succeeded,
        .summary.attempted
    )]
    SourceAborted {
        summary: IndexingSummary,
        #[source]
        source: SourceError,
    },

    #[error("Pipeline error: {0}")]
    PipelineError(#[from] PipelineError),

    #[error("Indexer error: {0}")]
    IndexerError(#[from] IndexerError),
}

impl IngestError {
    /// Counts of the run, if streaming had started when the error happened.
    pub fn summary(&self) -> Option<&IndexingSummary> {
        match self {
            Self::SourceAborted { summary, .. } => Some(summary),
            Self::IndexerError(e) => e.summary(),
            _ => None,
        }
    }
}
