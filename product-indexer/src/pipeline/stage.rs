//! The pipeline stage contract.

use product_indexer_shared::{DocumentDraft, DocumentError, RawRecord};
use thiserror::Error;

/// Errors a stage can raise for a single record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    /// A field the stage needs is absent (or null) and has no default.
    #[error("Missing required field '{field}'")]
    MissingField { field: String },

    /// A field is present but its value cannot be used.
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// The finished draft could not be sealed into a document.
    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl StageError {
    /// Create a missing field error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// One transformation step of the pipeline.
///
/// A stage declares the fields it touches so the [`PipelineManager`] can check,
/// when it is built, that every field a stage depends on was written by an
/// earlier stage:
///
/// - `reads` - columns of the raw record the stage consumes
/// - `requires` - draft fields that earlier stages must have written
/// - `writes` - draft fields the stage always sets on success
///
/// Stages hold no mutable state: the same stage instance is applied to every
/// record, possibly from several tasks.
///
/// [`PipelineManager`]: super::PipelineManager
pub trait PipelineStage: Send + Sync {
    /// Name used in errors and logs.
    fn name(&self) -> &str;

    fn reads(&self) -> Vec<&str> {
        Vec::new()
    }

    fn requires(&self) -> Vec<&str> {
        Vec::new()
    }

    fn writes(&self) -> Vec<&str>;

    /// Whether the stage sets the document identifier.
    fn sets_identifier(&self) -> bool {
        false
    }

    /// Transform the draft for one record.
    ///
    /// # Arguments
    ///
    /// * `record` - The source record, unchanged across stages
    /// * `draft` - The output of the previous stage (empty for the first stage)
    fn apply(&self, record: &RawRecord, draft: DocumentDraft)
        -> Result<DocumentDraft, StageError>;
}
