//! OpenSearch implementation of the index repository.
//!
//! This module provides a concrete implementation of `IndexRepository`
//! using OpenSearch as the backend.

mod bulk;
mod index_config;
mod repository;

pub use bulk::{build_bulk_body, parse_bulk_response, BulkItem, BulkItemError, BulkResponse};
pub use index_config::{get_index_settings, IndexConfig, DEFAULT_INDEX_NAME};
pub use repository::OpenSearchRepository;
