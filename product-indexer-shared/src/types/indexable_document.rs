//! Document types produced by the transformation pipeline.
//!
//! Stages accumulate fields on a [`DocumentDraft`]. Once every stage has run the
//! draft is sealed into an immutable [`IndexableDocument`], which always carries
//! the identifier used as its primary key in the search index.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised when sealing a draft into an indexable document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// No stage set the document identifier.
    #[error("Document identifier was never set")]
    MissingIdentifier,

    /// The identifier was set to an empty string.
    #[error("Document identifier is empty")]
    EmptyIdentifier,
}

/// Intermediate document passed from one pipeline stage to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentDraft {
    id: Option<String>,
    fields: Map<String, Value>,
}

impl DocumentDraft {
    /// Create an empty draft.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the document identifier.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// The identifier, if a stage has set it.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Builder-style variant of [`DocumentDraft::insert`].
    pub fn with_field(mut self, field: impl Into<String>, value: Value) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Seal the draft into an [`IndexableDocument`].
    ///
    /// # Returns
    ///
    /// * `Ok(IndexableDocument)` - If a non-empty identifier was set
    /// * `Err(DocumentError)` - If the identifier is missing or empty
    pub fn finish(self) -> Result<IndexableDocument, DocumentError> {
        match self.id {
            None => Err(DocumentError::MissingIdentifier),
            Some(id) => IndexableDocument::new(id, self.fields),
        }
    }
}

/// A document ready for submission to the search index.
///
/// The identifier is the document's primary key in the index; `fields` is the
/// document source. Documents are never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexableDocument {
    id: String,
    fields: Map<String, Value>,
}

impl IndexableDocument {
    /// Create a document directly from an identifier and its fields.
    ///
    /// # Returns
    ///
    /// * `Err(DocumentError::EmptyIdentifier)` - If the identifier is empty
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Result<Self, DocumentError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DocumentError::EmptyIdentifier);
        }
        Ok(Self { id, fields })
    }

    /// The document's primary key in the index.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The document source.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_finish_with_identifier() {
        let mut draft = DocumentDraft::new().with_field("product_title", json!("Kettle"));
        draft.set_id("B000");

        let doc = draft.finish().unwrap();

        assert_eq!(doc.id(), "B000");
        assert_eq!(doc.get("product_title"), Some(&json!("Kettle")));
    }

    #[test]
    fn test_finish_without_identifier() {
        let draft = DocumentDraft::new().with_field("product_title", json!("Kettle"));
        assert_eq!(draft.finish().unwrap_err(), DocumentError::MissingIdentifier);
    }

    #[test]
    fn test_finish_with_empty_identifier() {
        let mut draft = DocumentDraft::new();
        draft.set_id("");
        assert_eq!(draft.finish().unwrap_err(), DocumentError::EmptyIdentifier);
    }

    #[test]
    fn test_insert_replaces_value() {
        let mut draft = DocumentDraft::new();
        draft.insert("brand", json!("A"));
        draft.insert("brand", json!("B"));

        assert_eq!(draft.get_str("brand"), Some("B"));
        assert_eq!(draft.get("color"), None);
    }

    #[test]
    fn test_new_rejects_empty_identifier() {
        let result = IndexableDocument::new("", Map::new());
        assert_eq!(result.unwrap_err(), DocumentError::EmptyIdentifier);

        let doc = IndexableDocument::new("B001", Map::new()).unwrap();
        assert_eq!(doc.id(), "B001");
    }
}
