//! Index repository trait definition.
//!
//! This module defines the abstract interface for index lifecycle and bulk write
//! operations, allowing for different backend implementations (OpenSearch,
//! Elasticsearch, in-memory test doubles, etc.).

use async_trait::async_trait;
use product_indexer_shared::IndexableDocument;

use crate::errors::SearchIndexError;
use crate::types::BatchResult;

/// Abstracts the underlying search index implementation.
///
/// The repository owns the connection to the search engine and is the only
/// component that writes to it. Implementations must be safe to share across
/// tasks: the indexer may keep several bulk writes in flight at once.
///
/// All methods return `Result<T, SearchIndexError>` for consistent error handling
/// across backend implementations.
#[async_trait]
pub trait IndexRepository: Send + Sync {
    /// The name of the index this repository writes to.
    fn index_name(&self) -> &str;

    /// Check whether the index exists.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` / `Ok(false)` - Whether the index is present
    /// * `Err(SearchIndexError)` - If the backend could not be queried
    async fn index_exists(&self) -> Result<bool, SearchIndexError>;

    /// Delete the index.
    ///
    /// Idempotent: deleting an index that does not exist succeeds.
    async fn delete_index(&self) -> Result<(), SearchIndexError>;

    /// Create the index with its configured settings and mapping.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index was created
    /// * `Err(SearchIndexError::IndexCreationError)` - If the backend rejected the request
    /// * `Err(SearchIndexError::TransportError)` - If the backend was unreachable
    async fn create_index(&self) -> Result<(), SearchIndexError>;

    /// Write a batch of documents in a single round trip.
    ///
    /// Partial failure is reported per document in the returned `BatchResult`.
    /// An `Err` means the batch as a whole failed and no per-document outcome is
    /// known.
    ///
    /// # Arguments
    ///
    /// * `documents` - The documents to write, keyed by their identifiers
    async fn bulk_write(
        &self,
        documents: &[IndexableDocument],
    ) -> Result<BatchResult, SearchIndexError>;
}
