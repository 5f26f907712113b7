//! # Product Indexer Shared
//!
//! This crate defines the data structures shared across the product indexer:
//! raw source records, the schema they are validated against, and the documents
//! produced by the transformation pipeline.

pub mod types;

pub use types::indexable_document::{DocumentDraft, DocumentError, IndexableDocument};
pub use types::raw_record::{RawRecord, RecordError, RecordSchema};
