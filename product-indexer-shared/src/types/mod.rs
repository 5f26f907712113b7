//! This module defines the core data structures used across the product indexer.
//! It re-exports the record and document types.

pub mod indexable_document;
pub mod raw_record;

pub use indexable_document::{DocumentDraft, DocumentError, IndexableDocument};
pub use raw_record::{RawRecord, RecordError, RecordSchema};
