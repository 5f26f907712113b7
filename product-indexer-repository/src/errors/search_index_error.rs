//! Search index error types.
//!
//! This module defines the unified error type for all index repository operations,
//! covering index lifecycle failures, batch-level transport failures and
//! per-document write rejections.

use thiserror::Error;

/// Unified errors from index repository operations.
///
/// Used by the `IndexRepository` trait for every operation. Errors returned as
/// `Err` from `bulk_write` are batch-level failures; rejections of individual
/// documents are reported inside `BatchResult` as `DocumentWriteError`s instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchIndexError {
    /// Invalid input (e.g., malformed URL, empty index name).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failed to build a client for the search index backend.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A request could not be delivered or its response could not be read.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Failed to check whether the index exists.
    #[error("Index lookup error: {0}")]
    IndexLookupError(String),

    /// Failed to create the index, or the backend rejected its settings/mapping.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// Failed to delete the index.
    #[error("Index deletion error: {0}")]
    IndexDeletionError(String),

    /// The backend rejected a bulk request as a whole.
    #[error("Bulk request error: {0}")]
    BulkRequestError(String),

    /// The backend rejected a single document within a bulk request.
    #[error("Document write error: {0}")]
    DocumentWriteError(String),

    /// Failed to parse a response from the backend.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Batch size exceeds configured maximum.
    #[error("Batch size {provided} exceeds maximum {max}")]
    BatchSizeExceeded { provided: usize, max: usize },
}

impl SearchIndexError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    /// Create an index lookup error.
    pub fn index_lookup(msg: impl Into<String>) -> Self {
        Self::IndexLookupError(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create an index deletion error.
    pub fn index_deletion(msg: impl Into<String>) -> Self {
        Self::IndexDeletionError(msg.into())
    }

    /// Create a bulk request error.
    pub fn bulk_request(msg: impl Into<String>) -> Self {
        Self::BulkRequestError(msg.into())
    }

    /// Create a document write error.
    pub fn document_write(msg: impl Into<String>) -> Self {
        Self::DocumentWriteError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a batch size exceeded error.
    pub fn batch_size_exceeded(provided: usize, max: usize) -> Self {
        Self::BatchSizeExceeded { provided, max }
    }

    /// Whether the error means the backend connection is unusable.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportError(_) | Self::ConnectionError(_))
    }
}
