//! Error types for the product indexer repository.
//!
//! This module provides a unified error type for all index repository operations.

mod search_index_error;

pub use search_index_error::SearchIndexError;
