//! # Product Indexer Repository
//!
//! This crate provides the index repository abstraction used by the product
//! indexer: index lifecycle (exists, create, delete) and bulk document writes
//! with per-document outcomes. It includes definitions for errors, interfaces,
//! and a concrete implementation for OpenSearch.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod types;

pub use config::ConnectionConfig;
pub use errors::SearchIndexError;
pub use interfaces::IndexRepository;
pub use opensearch::OpenSearchRepository;
pub use types::{BatchResult, DocumentFailure};
