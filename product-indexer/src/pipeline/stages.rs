//! Built-in pipeline stages.

use std::collections::HashMap;

use lazy_static::lazy_static;
use product_indexer_shared::{DocumentDraft, RawRecord};
use regex::Regex;
use serde_json::Value;

use super::stage::{PipelineStage, StageError};

lazy_static! {
    static ref MARKUP_TAG: Regex = Regex::new(r"<[^>]*>").expect("valid tag pattern");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid whitespace pattern");
}

/// What a stage does when its source field is absent or null.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingPolicy {
    /// Fail the record.
    Fail,
    /// Write the given value instead.
    Default(Value),
}

impl MissingPolicy {
    fn resolve(&self, field: &str) -> Result<Value, StageError> {
        match self {
            Self::Fail => Err(StageError::missing(field)),
            Self::Default(value) => Ok(value.clone()),
        }
    }
}

/// Sets the document identifier from a record column.
///
/// The identifier is also written as a regular field so it can be queried.
/// Numeric identifiers are converted to their decimal string form.
pub struct IdentifierStage {
    source: String,
}

impl IdentifierStage {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl PipelineStage for IdentifierStage {
    fn name(&self) -> &str {
        "identifier"
    }

    fn reads(&self) -> Vec<&str> {
        vec![self.source.as_str()]
    }

    fn writes(&self) -> Vec<&str> {
        vec![self.source.as_str()]
    }

    fn sets_identifier(&self) -> bool {
        true
    }

    fn apply(
        &self,
        record: &RawRecord,
        mut draft: DocumentDraft,
    ) -> Result<DocumentDraft, StageError> {
        let id = match record.value(&self.source) {
            None => return Err(StageError::missing(&self.source)),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(StageError::invalid(
                    &self.source,
                    format!("expected a string or number, got {}", other),
                ))
            }
        };

        if id.is_empty() {
            return Err(StageError::invalid(&self.source, "identifier is empty"));
        }

        draft.insert(self.source.clone(), Value::String(id.clone()));
        draft.set_id(id);
        Ok(draft)
    }
}

/// Copies a record column into the draft, optionally under another name.
pub struct CopyFieldStage {
    name: String,
    source: String,
    target: String,
    policy: MissingPolicy,
}

impl CopyFieldStage {
    /// Copy `source` to a draft field of the same name.
    pub fn new(source: impl Into<String>, policy: MissingPolicy) -> Self {
        let source = source.into();
        Self::renamed(source.clone(), source, policy)
    }

    /// Copy `source` to the draft field `target`.
    pub fn renamed(
        source: impl Into<String>,
        target: impl Into<String>,
        policy: MissingPolicy,
    ) -> Self {
        let source = source.into();
        Self {
            name: format!("copy:{}", source),
            source,
            target: target.into(),
            policy,
        }
    }
}

impl PipelineStage for CopyFieldStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> Vec<&str> {
        vec![self.source.as_str()]
    }

    fn writes(&self) -> Vec<&str> {
        vec![self.target.as_str()]
    }

    fn apply(
        &self,
        record: &RawRecord,
        mut draft: DocumentDraft,
    ) -> Result<DocumentDraft, StageError> {
        let value = match record.value(&self.source) {
            Some(value) => value.clone(),
            None => self.policy.resolve(&self.source)?,
        };
        draft.insert(self.target.clone(), value);
        Ok(draft)
    }
}

/// Strips markup tags from a text column and collapses whitespace.
///
/// Source descriptions and bullet points carry inline HTML (`<br>`, `<b>`...)
/// that would otherwise be indexed as text.
pub struct StripMarkupStage {
    name: String,
    source: String,
    target: String,
    policy: MissingPolicy,
}

impl StripMarkupStage {
    pub fn new(source: impl Into<String>, policy: MissingPolicy) -> Self {
        let source = source.into();
        Self {
            name: format!("strip_markup:{}", source),
            target: source.clone(),
            source,
            policy,
        }
    }

    /// Remove tags, decode the common entities and normalize whitespace.
    pub fn clean(text: &str) -> String {
        let without_tags = MARKUP_TAG.replace_all(text, " ");
        let decoded = without_tags
            .replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&");
        WHITESPACE.replace_all(&decoded, " ").trim().to_string()
    }
}

impl PipelineStage for StripMarkupStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> Vec<&str> {
        vec![self.source.as_str()]
    }

    fn writes(&self) -> Vec<&str> {
        vec![self.target.as_str()]
    }

    fn apply(
        &self,
        record: &RawRecord,
        mut draft: DocumentDraft,
    ) -> Result<DocumentDraft, StageError> {
        let value = match record.value(&self.source) {
            Some(Value::String(text)) => Value::String(Self::clean(text)),
            Some(other) => {
                return Err(StageError::invalid(
                    &self.source,
                    format!("expected text, got {}", other),
                ))
            }
            None => self.policy.resolve(&self.source)?,
        };
        draft.insert(self.target.clone(), value);
        Ok(draft)
    }
}

/// Maps a draft field through a static lookup table.
///
/// Reads from the draft rather than the record, so it must run after the stage
/// that writes its source field.
pub struct LookupStage {
    name: String,
    source: String,
    target: String,
    table: HashMap<String, String>,
    fallback: Option<String>,
}

impl LookupStage {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        table: HashMap<String, String>,
    ) -> Self {
        let source = source.into();
        Self {
            name: format!("lookup:{}", source),
            source,
            target: target.into(),
            table,
            fallback: None,
        }
    }

    /// Value written when the source is absent or not in the table.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }
}

impl PipelineStage for LookupStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<&str> {
        vec![self.source.as_str()]
    }

    fn writes(&self) -> Vec<&str> {
        vec![self.target.as_str()]
    }

    fn apply(
        &self,
        _record: &RawRecord,
        mut draft: DocumentDraft,
    ) -> Result<DocumentDraft, StageError> {
        let key = draft.get_str(&self.source);
        let mapped = key
            .and_then(|key| self.table.get(key))
            .or(self.fallback.as_ref())
            .cloned();

        match mapped {
            Some(value) => {
                draft.insert(self.target.clone(), Value::String(value));
                Ok(draft)
            }
            None => Err(match key {
                Some(key) => {
                    StageError::invalid(&self.source, format!("no mapping for '{}'", key))
                }
                None => StageError::missing(&self.source),
            }),
        }
    }
}

/// Joins several text fields of the draft into one field.
///
/// Null and empty values are skipped.
pub struct ConcatFieldsStage {
    sources: Vec<String>,
    target: String,
    separator: String,
}

impl ConcatFieldsStage {
    pub fn new<I, S>(sources: I, target: impl Into<String>, separator: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            target: target.into(),
            separator: separator.into(),
        }
    }
}

impl PipelineStage for ConcatFieldsStage {
    fn name(&self) -> &str {
        &self.target
    }

    fn requires(&self) -> Vec<&str> {
        self.sources.iter().map(String::as_str).collect()
    }

    fn writes(&self) -> Vec<&str> {
        vec![self.target.as_str()]
    }

    fn apply(
        &self,
        _record: &RawRecord,
        mut draft: DocumentDraft,
    ) -> Result<DocumentDraft, StageError> {
        let parts: Vec<&str> = self
            .sources
            .iter()
            .filter_map(|field| draft.get_str(field))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect();
        let joined = parts.join(&self.separator);

        draft.insert(self.target.clone(), Value::String(joined));
        Ok(draft)
    }
}
