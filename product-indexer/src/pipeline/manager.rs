//! Ordered composition of pipeline stages.

use std::collections::HashSet;
use std::fmt;

use product_indexer_shared::{DocumentDraft, IndexableDocument, RawRecord, RecordSchema};
use thiserror::Error;
use tracing::debug;

use super::stage::{PipelineStage, StageError};

/// Errors raised when a pipeline is assembled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Pipeline has no stages")]
    Empty,

    #[error("No stage sets the document identifier")]
    NoIdentifierStage,

    /// A stage depends on a draft field that no earlier stage writes.
    #[error("Stage '{stage}' requires field '{field}' which no earlier stage writes")]
    UnsatisfiedDependency { stage: String, field: String },

    /// A stage reads a column the record source does not carry.
    #[error("Stage '{stage}' reads column '{column}' which is not in the record schema")]
    UnknownColumn { stage: String, column: String },
}

/// How a failed record is identified in errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRef {
    /// The identifier, when a stage set it before the failure.
    Id(String),
    /// The record's position in its source otherwise.
    Ordinal(u64),
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {}", id),
            Self::Ordinal(ordinal) => write!(f, "ordinal {}", ordinal),
        }
    }
}

/// A record could not be turned into a document.
///
/// Recoverable: the record is skipped and counted as failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Stage '{stage}' failed for record {record}: {source}")]
pub struct TransformationError {
    pub stage: String,
    pub record: RecordRef,
    #[source]
    pub source: StageError,
}

/// Stage name reported when sealing the final draft fails.
const FINISH_STAGE: &str = "finish";

/// Applies an ordered list of stages to raw records.
pub struct PipelineManager {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl PipelineManager {
    /// Assemble a pipeline, checking the declared field contract of every stage.
    ///
    /// # Returns
    ///
    /// * `Ok(PipelineManager)` - If every `requires` field is written by an earlier stage
    ///   and some stage sets the identifier
    /// * `Err(PipelineError)` - Describing the first violation otherwise
    pub fn new(stages: Vec<Box<dyn PipelineStage>>) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::Empty);
        }
        if !stages.iter().any(|stage| stage.sets_identifier()) {
            return Err(PipelineError::NoIdentifierStage);
        }

        let mut written: HashSet<&str> = HashSet::new();
        for stage in &stages {
            if let Some(field) = stage
                .requires()
                .into_iter()
                .find(|field| !written.contains(field))
            {
                return Err(PipelineError::UnsatisfiedDependency {
                    stage: stage.name().to_string(),
                    field: field.to_string(),
                });
            }
            written.extend(stage.writes());
        }

        debug!(stages = stages.len(), "Pipeline assembled");
        Ok(Self { stages })
    }

    /// Check that every column the stages read is declared by `schema`.
    pub fn validate_against(&self, schema: &RecordSchema) -> Result<(), PipelineError> {
        for stage in &self.stages {
            if let Some(column) = stage
                .reads()
                .into_iter()
                .find(|column| !schema.contains(column))
            {
                return Err(PipelineError::UnknownColumn {
                    stage: stage.name().to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage, in order, against one record.
    pub fn apply_pipelines(
        &self,
        record: &RawRecord,
    ) -> Result<IndexableDocument, TransformationError> {
        let mut draft = DocumentDraft::new();
        let mut known_id: Option<String> = None;

        for stage in &self.stages {
            draft = stage.apply(record, draft).map_err(|source| TransformationError {
                stage: stage.name().to_string(),
                record: Self::record_ref(record, known_id.as_deref()),
                source,
            })?;

            if known_id.is_none() {
                known_id = draft.id().map(str::to_string);
            }
        }

        draft.finish().map_err(|e| TransformationError {
            stage: FINISH_STAGE.to_string(),
            record: Self::record_ref(record, known_id.as_deref()),
            source: e.into(),
        })
    }

    fn record_ref(record: &RawRecord, id: Option<&str>) -> RecordRef {
        match id {
            Some(id) => RecordRef::Id(id.to_string()),
            None => RecordRef::Ordinal(record.ordinal()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::{
        ConcatFieldsStage, CopyFieldStage, IdentifierStage, MissingPolicy,
    };
    use product_indexer_shared::DocumentError;
    use serde_json::json;

    fn schema() -> RecordSchema {
        RecordSchema::new(["id", "title", "brand"])
    }

    fn record(line: &str) -> RawRecord {
        RawRecord::from_json_line(&schema(), 5, line).unwrap()
    }

    /// Writes a field without setting the identifier.
    struct NoIdStage;

    impl PipelineStage for NoIdStage {
        fn name(&self) -> &str {
            "no_id"
        }

        fn writes(&self) -> Vec<&str> {
            vec!["marker"]
        }

        fn sets_identifier(&self) -> bool {
            true
        }

        fn apply(
            &self,
            _record: &RawRecord,
            draft: DocumentDraft,
        ) -> Result<DocumentDraft, StageError> {
            Ok(draft.with_field("marker", json!(true)))
        }
    }

    fn stages() -> Vec<Box<dyn PipelineStage>> {
        vec![
            Box::new(IdentifierStage::new("id")),
            Box::new(CopyFieldStage::new("title", MissingPolicy::Fail)),
            Box::new(CopyFieldStage::new("brand", MissingPolicy::Default(json!("")))),
            Box::new(ConcatFieldsStage::new(["title", "brand"], "search_text", " ")),
        ]
    }

    #[test]
    fn test_apply_pipelines() {
        let pipeline = PipelineManager::new(stages()).unwrap();
        let doc = pipeline
            .apply_pipelines(&record(r#"{"id":"B000","title":"Kettle","brand":"Acme"}"#))
            .unwrap();

        assert_eq!(doc.id(), "B000");
        assert_eq!(doc.get("id"), Some(&json!("B000")));
        assert_eq!(doc.get("search_text"), Some(&json!("Kettle Acme")));
    }

    #[test]
    fn test_new_rejects_empty_pipeline() {
        assert_eq!(
            PipelineManager::new(Vec::new()).err(),
            Some(PipelineError::Empty)
        );
    }

    #[test]
    fn test_new_requires_identifier_stage() {
        let stages: Vec<Box<dyn PipelineStage>> =
            vec![Box::new(CopyFieldStage::new("title", MissingPolicy::Fail))];
        assert_eq!(
            PipelineManager::new(stages).err(),
            Some(PipelineError::NoIdentifierStage)
        );
    }

    #[test]
    fn test_new_rejects_unsatisfied_dependency() {
        let stages: Vec<Box<dyn PipelineStage>> = vec![
            Box::new(IdentifierStage::new("id")),
            Box::new(ConcatFieldsStage::new(["title", "brand"], "search_text", " ")),
            Box::new(CopyFieldStage::new("title", MissingPolicy::Fail)),
            Box::new(CopyFieldStage::new("brand", MissingPolicy::Fail)),
        ];

        assert_eq!(
            PipelineManager::new(stages).err(),
            Some(PipelineError::UnsatisfiedDependency {
                stage: "search_text".to_string(),
                field: "title".to_string(),
            })
        );
    }

    #[test]
    fn test_validate_against_schema() {
        let pipeline = PipelineManager::new(stages()).unwrap();
        assert!(pipeline.validate_against(&schema()).is_ok());

        let narrow = RecordSchema::new(["id", "title"]);
        assert_eq!(
            pipeline.validate_against(&narrow),
            Err(PipelineError::UnknownColumn {
                stage: "copy:brand".to_string(),
                column: "brand".to_string(),
            })
        );
    }

    #[test]
    fn test_failure_before_identifier_reports_ordinal() {
        let pipeline = PipelineManager::new(stages()).unwrap();
        let err = pipeline
            .apply_pipelines(&record(r#"{"id":null,"title":"Kettle","brand":null}"#))
            .unwrap_err();

        assert_eq!(err.stage, "identifier");
        assert_eq!(err.record, RecordRef::Ordinal(5));
        assert_eq!(err.source, StageError::missing("id"));
    }

    #[test]
    fn test_failure_after_identifier_reports_id() {
        let pipeline = PipelineManager::new(stages()).unwrap();
        let err = pipeline
            .apply_pipelines(&record(r#"{"id":"B000","title":null,"brand":null}"#))
            .unwrap_err();

        assert_eq!(err.stage, "copy:title");
        assert_eq!(err.record, RecordRef::Id("B000".to_string()));
        assert_eq!(
            err.to_string(),
            "Stage 'copy:title' failed for record id B000: Missing required field 'title'"
        );
    }

    #[test]
    fn test_finish_without_identifier_fails_record() {
        let stages: Vec<Box<dyn PipelineStage>> = vec![Box::new(NoIdStage)];
        let pipeline = PipelineManager::new(stages).unwrap();
        let err = pipeline
            .apply_pipelines(&record(r#"{"id":"B000","title":null,"brand":null}"#))
            .unwrap_err();

        assert_eq!(err.stage, "finish");
        assert_eq!(err.source, StageError::Document(DocumentError::MissingIdentifier));
    }

    #[test]
    fn test_stage_names() {
        let pipeline = PipelineManager::new(stages()).unwrap();
        assert_eq!(
            pipeline.stage_names(),
            vec!["identifier", "copy:title", "copy:brand", "search_text"]
        );
    }
}
