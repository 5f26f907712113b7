//! # Product Indexer
//!
//! Loads a product catalogue into an OpenSearch index.
//!
//! ## Architecture
//!
//! An indexing run follows a Source-Pipeline-Indexer flow:
//!
//! 1. **Source**: Streams raw records from a JSON-lines file
//! 2. **Pipeline**: Transforms each record into an indexable document
//! 3. **Indexer**: Prepares the index and bulk writes documents in batches
//! 4. **Orchestrator**: Wires one run end to end
//!
//! ## Modules
//!
//! - [`config`]: Configuration and dependency initialization
//! - [`source`]: JSON-lines record source
//! - [`pipeline`]: Transformation stages and the pipeline manager
//! - [`indexer`]: Index lifecycle and batched bulk writes
//! - [`orchestrator`]: Coordinates the run
//! - [`errors`]: Error types for the indexer

pub mod config;
pub mod errors;
pub mod indexer;
pub mod orchestrator;
pub mod pipeline;
pub mod source;

pub use config::Dependencies;
pub use errors::IngestError;

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ingest error.
    #[error("Ingest error: {0}")]
    IngestError(#[from] IngestError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
