//! Result types for bulk write operations.

use crate::errors::SearchIndexError;

/// A document the backend rejected within an otherwise successful bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFailure {
    /// The rejected document's identifier.
    pub document_id: String,
    /// Why the backend rejected it.
    pub error: SearchIndexError,
}

/// Aggregate outcome of one bulk write.
///
/// A batch can partially succeed: `succeeded` counts accepted documents and
/// `failures` lists every rejected one, so `attempted == succeeded + failures.len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    /// Number of documents submitted in the batch.
    pub attempted: usize,
    /// Number of documents the backend accepted.
    pub succeeded: usize,
    /// Rejected documents, in submission order.
    pub failures: Vec<DocumentFailure>,
}

impl BatchResult {
    /// A result in which every submitted document was accepted.
    pub fn all_succeeded(attempted: usize) -> Self {
        Self {
            attempted,
            succeeded: attempted,
            failures: Vec::new(),
        }
    }

    /// Number of rejected documents.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Record an accepted document.
    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    /// Record a rejected document.
    pub fn record_failure(&mut self, document_id: impl Into<String>, error: SearchIndexError) {
        self.attempted += 1;
        self.failures.push(DocumentFailure {
            document_id: document_id.into(),
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_batch_counts() {
        let mut result = BatchResult::default();
        for _ in 0..499 {
            result.record_success();
        }
        result.record_failure("B000", SearchIndexError::document_write("bad price"));

        assert_eq!(result.attempted, 500);
        assert_eq!(result.succeeded, 499);
        assert_eq!(result.failed(), 1);
        assert_eq!(result.failures[0].document_id, "B000");
    }

    #[test]
    fn test_all_succeeded() {
        let result = BatchResult::all_succeeded(3);
        assert_eq!(result.attempted, 3);
        assert_eq!(result.succeeded, 3);
        assert_eq!(result.failed(), 0);
    }
}
