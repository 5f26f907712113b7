//! Bulk API request building and response parsing.
//!
//! The `_bulk` endpoint takes newline-delimited action/source pairs and answers
//! with one item per action, in request order. Items are matched back to the
//! submitted documents by position.

use std::collections::HashMap;

use opensearch::http::request::JsonBody;
use product_indexer_shared::IndexableDocument;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::SearchIndexError;
use crate::types::BatchResult;

/// Response body of a `_bulk` request.
#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    /// Whether any item failed.
    #[serde(default)]
    pub errors: bool,
    /// One entry per action, keyed by the action name (`index`, `create`, ...).
    pub items: Vec<HashMap<String, BulkItem>>,
}

/// Outcome of one bulk action.
#[derive(Debug, Deserialize)]
pub struct BulkItem {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub status: u16,
    pub error: Option<BulkItemError>,
}

/// Error detail attached to a failed bulk action.
#[derive(Debug, Deserialize)]
pub struct BulkItemError {
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: Option<String>,
}

impl BulkItem {
    fn succeeded(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }

    fn failure_reason(&self) -> String {
        match &self.error {
            Some(BulkItemError {
                kind,
                reason: Some(reason),
            }) => format!("{} (status {}): {}", kind, self.status, reason),
            Some(BulkItemError { kind, reason: None }) => {
                format!("{} (status {})", kind, self.status)
            }
            None => format!("rejected with status {}", self.status),
        }
    }
}

/// Build the `_bulk` request body for a batch of documents.
///
/// Each document becomes an `index` action keyed by its identifier, so writing
/// a document whose identifier already exists replaces it.
pub fn build_bulk_body(documents: &[IndexableDocument]) -> Vec<JsonBody<Value>> {
    let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);

    for doc in documents {
        body.push(json!({"index": {"_id": doc.id()}}).into());
        body.push(Value::Object(doc.fields().clone()).into());
    }

    body
}

/// Turn a `_bulk` response into a per-document [`BatchResult`].
///
/// # Returns
///
/// * `Ok(BatchResult)` - With one outcome per submitted document
/// * `Err(SearchIndexError::ParseError)` - If the items cannot be matched to the documents
pub fn parse_bulk_response(
    response: BulkResponse,
    documents: &[IndexableDocument],
) -> Result<BatchResult, SearchIndexError> {
    if response.items.len() != documents.len() {
        return Err(SearchIndexError::parse(format!(
            "Bulk response has {} items for {} documents",
            response.items.len(),
            documents.len()
        )));
    }

    let mut result = BatchResult::default();

    for (position, (doc, item)) in documents.iter().zip(response.items).enumerate() {
        let Some(outcome) = item.into_values().next() else {
            return Err(SearchIndexError::parse(format!(
                "Bulk response item {} has no action",
                position
            )));
        };

        if outcome.succeeded() {
            result.record_success();
        } else {
            result.record_failure(
                doc.id(),
                SearchIndexError::document_write(outcome.failure_reason()),
            );
        }
    }

    Ok(result)
}
