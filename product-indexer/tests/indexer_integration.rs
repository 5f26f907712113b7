//! Integration tests for the product indexer.
//!
//! These tests use the real Indexer, pipeline and orchestrator with a mock
//! IndexRepository to ensure reliable testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Map, Value};
use tokio::time::timeout;

use product_indexer::errors::{IndexerError, IngestError, SourceError};
use product_indexer::indexer::{Indexer, IndexerConfig, IndexerState};
use product_indexer::orchestrator::{Orchestrator, OrchestratorConfig};
use product_indexer::pipeline::products::{
    locale_languages, product_stages, PRODUCT_BRAND, PRODUCT_BULLET_POINT, PRODUCT_COLOR_NAME,
    PRODUCT_DESCRIPTION, PRODUCT_ID, PRODUCT_LANGUAGE, PRODUCT_LOCALE, PRODUCT_TITLE, SEARCH_TEXT,
};
use product_indexer::pipeline::stages::{
    ConcatFieldsStage, CopyFieldStage, IdentifierStage, LookupStage, MissingPolicy,
    StripMarkupStage,
};
use product_indexer::pipeline::{
    product_pipeline, product_schema, PipelineError, PipelineManager, PipelineStage,
    TransformationError,
};
use product_indexer::source::JsonlRecordSource;
use product_indexer_repository::{BatchResult, IndexRepository, SearchIndexError};
use product_indexer_shared::{IndexableDocument, RawRecord};

// Mock repository for testing
struct MockRepository {
    exists: AtomicBool,
    calls: Mutex<Vec<&'static str>>,
    batches: Mutex<Vec<Vec<String>>>,
    /// Documents the mock rejects individually.
    rejected_ids: HashSet<String>,
    /// A batch containing this document fails as a whole.
    failing_id: Option<String>,
    /// Write latency of a batch, keyed by the batch's first document.
    delays: HashMap<String, Duration>,
}

impl MockRepository {
    fn new() -> Self {
        Self {
            exists: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
            rejected_ids: HashSet::new(),
            failing_id: None,
            delays: HashMap::new(),
        }
    }

    fn existing() -> Self {
        let repository = Self::new();
        repository.exists.store(true, Ordering::SeqCst);
        repository
    }

    fn rejecting(ids: &[&str]) -> Self {
        Self {
            rejected_ids: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::new()
        }
    }

    fn failing_on(id: &str) -> Self {
        Self {
            failing_id: Some(id.to_string()),
            ..Self::new()
        }
    }

    fn delaying(delays: &[(&str, u64)]) -> Self {
        Self {
            delays: delays
                .iter()
                .map(|(id, millis)| (id.to_string(), Duration::from_millis(*millis)))
                .collect(),
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    fn written_ids(&self) -> Vec<String> {
        self.batches.lock().unwrap().concat()
    }
}

#[async_trait::async_trait]
impl IndexRepository for MockRepository {
    fn index_name(&self) -> &str {
        "products_test"
    }

    async fn index_exists(&self) -> Result<bool, SearchIndexError> {
        self.calls.lock().unwrap().push("exists");
        Ok(self.exists.load(Ordering::SeqCst))
    }

    async fn delete_index(&self) -> Result<(), SearchIndexError> {
        self.calls.lock().unwrap().push("delete");
        self.exists.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn create_index(&self) -> Result<(), SearchIndexError> {
        self.calls.lock().unwrap().push("create");
        if self.exists.swap(true, Ordering::SeqCst) {
            return Err(SearchIndexError::index_creation(
                "resource_already_exists_exception",
            ));
        }
        Ok(())
    }

    async fn bulk_write(
        &self,
        documents: &[IndexableDocument],
    ) -> Result<BatchResult, SearchIndexError> {
        if let Some(delay) = documents.first().and_then(|doc| self.delays.get(doc.id())) {
            tokio::time::sleep(*delay).await;
        }

        if let Some(failing_id) = &self.failing_id {
            if documents.iter().any(|doc| doc.id() == failing_id.as_str()) {
                return Err(SearchIndexError::transport("connection reset by peer"));
            }
        }

        let mut result = BatchResult::default();
        for doc in documents {
            if self.rejected_ids.contains(doc.id()) {
                result.record_failure(
                    doc.id(),
                    SearchIndexError::document_write("mapper_parsing_exception (status 400)"),
                );
            } else {
                result.record_success();
            }
        }

        self.batches
            .lock()
            .unwrap()
            .push(documents.iter().map(|doc| doc.id().to_string()).collect());
        Ok(result)
    }
}

fn document(n: usize) -> Result<IndexableDocument, TransformationError> {
    let mut fields = Map::new();
    fields.insert(PRODUCT_ID.to_string(), json!(format!("P{}", n)));
    Ok(IndexableDocument::new(format!("P{}", n), fields).unwrap())
}

fn documents(
    count: usize,
) -> impl Stream<Item = Result<IndexableDocument, TransformationError>> {
    stream::iter((0..count).map(document))
}

async fn ready_indexer(repository: Arc<MockRepository>, config: IndexerConfig) -> Indexer {
    let mut indexer = Indexer::new(repository, config).unwrap();
    indexer.create_index(false).await.unwrap();
    indexer
}

fn batch_config(batch_size: usize, max_in_flight_batches: usize) -> IndexerConfig {
    IndexerConfig {
        batch_size,
        max_in_flight_batches,
    }
}

#[tokio::test]
async fn test_progress_called_once_per_document() {
    let repository = Arc::new(MockRepository::new());
    let mut indexer = ready_indexer(repository.clone(), batch_config(500, 1)).await;

    let progress = AtomicUsize::new(0);
    let summary = indexer
        .bulk_index(documents(1200), || {
            progress.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    assert_eq!(progress.load(Ordering::SeqCst), 1200);
    assert_eq!(repository.batch_sizes(), vec![500, 500, 200]);
    assert_eq!(summary.batches_written, 3);
    assert_eq!(summary.succeeded, 1200);
}

#[tokio::test]
async fn test_all_valid_documents_succeed() {
    let repository = Arc::new(MockRepository::new());
    let mut indexer = ready_indexer(repository.clone(), IndexerConfig::default()).await;

    let summary = indexer.bulk_index(documents(1000), || {}).await.unwrap();

    assert_eq!(summary.attempted, 1000);
    assert_eq!(summary.succeeded, 1000);
    assert_eq!(summary.failed(), 0);
    assert_eq!(repository.batch_sizes(), vec![500, 500]);
    assert_eq!(indexer.state(), IndexerState::Finished);
}

#[tokio::test]
async fn test_concurrent_batches_write_every_document() {
    let repository = Arc::new(MockRepository::new());
    let mut indexer = ready_indexer(repository.clone(), batch_config(7, 4)).await;

    let summary = indexer.bulk_index(documents(100), || {}).await.unwrap();

    assert_eq!(summary.succeeded, 100);
    assert_eq!(summary.batches_written, 15);
    let mut written = repository.written_ids();
    written.sort();
    let mut expected: Vec<String> = (0..100).map(|n| format!("P{}", n)).collect();
    expected.sort();
    assert_eq!(written, expected);
}

#[tokio::test(start_paused = true)]
async fn test_progress_follows_submission_order_when_batches_finish_out_of_order() {
    let repository = Arc::new(MockRepository::delaying(&[("P0", 30), ("P4", 10)]));
    let mut indexer = ready_indexer(repository.clone(), batch_config(2, 3)).await;

    // Batches written when each progress call was made.
    let mut written_at_progress = Vec::new();
    let summary = indexer
        .bulk_index(documents(6), || {
            written_at_progress.push(repository.batch_sizes().len());
        })
        .await
        .unwrap();

    let completion_order: Vec<String> = repository
        .batches
        .lock()
        .unwrap()
        .iter()
        .map(|batch| batch[0].clone())
        .collect();
    assert_eq!(completion_order, vec!["P2", "P4", "P0"]);
    // The first batch finishes last, so no document is reported before it.
    assert_eq!(written_at_progress, vec![3; 6]);
    assert_eq!(summary.succeeded, 6);
}

#[tokio::test]
async fn test_rejected_document_does_not_abort_run() {
    let repository = Arc::new(MockRepository::rejecting(&["P42"]));
    let mut indexer = ready_indexer(repository.clone(), batch_config(500, 1)).await;

    let progress = AtomicUsize::new(0);
    let summary = indexer
        .bulk_index(documents(500), || {
            progress.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    assert_eq!(summary.attempted, 500);
    assert_eq!(summary.succeeded, 499);
    assert_eq!(summary.write_failures, 1);
    assert_eq!(progress.load(Ordering::SeqCst), 500);
    assert_eq!(indexer.state(), IndexerState::Finished);
}

#[tokio::test]
async fn test_transformation_failures_are_counted_and_reported() {
    let repository = Arc::new(MockRepository::new());
    let mut indexer = ready_indexer(repository.clone(), batch_config(10, 1)).await;

    let pipeline = product_pipeline().unwrap();
    let schema = product_schema();
    let rows = vec![
        r#"{"product_id":"A","product_title":"Kettle","product_description":null,"product_bullet_point":null,"product_brand":null,"product_color_name":null,"product_locale":"jp"}"#,
        r#"{"product_id":"B","product_title":null,"product_description":null,"product_bullet_point":null,"product_brand":null,"product_color_name":null,"product_locale":"jp"}"#,
        r#"{"product_id":"C","product_title":"Mug","product_description":null,"product_bullet_point":null,"product_brand":null,"product_color_name":null,"product_locale":"us"}"#,
    ];
    let records: Vec<RawRecord> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| RawRecord::from_json_line(&schema, i as u64, row).unwrap())
        .collect();
    let docs = stream::iter(records).map(|record| pipeline.apply_pipelines(&record));

    let progress = AtomicUsize::new(0);
    let summary = indexer
        .bulk_index(docs, || {
            progress.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.transformation_failures, 1);
    assert_eq!(progress.load(Ordering::SeqCst), 3);
    assert_eq!(repository.written_ids(), vec!["A", "C"]);
}

#[tokio::test]
async fn test_transport_failure_after_successful_batches() {
    // Third batch (P1000..P1499) fails as a whole.
    let repository = Arc::new(MockRepository::failing_on("P1000"));
    let mut indexer = ready_indexer(repository.clone(), batch_config(500, 1)).await;

    let progress = AtomicUsize::new(0);
    let err = indexer
        .bulk_index(documents(3000), || {
            progress.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap_err();

    let summary = err.summary().expect("failure carries the summary").clone();
    assert!(matches!(err, IndexerError::BulkIndex(ref e) if e.source.is_transport()));
    assert_eq!(summary.succeeded, 1000);
    assert_eq!(summary.batches_written, 2);
    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.attempted, 1500);
    assert_eq!(summary.discarded, 500);
    assert_eq!(progress.load(Ordering::SeqCst), 1000);
    assert_eq!(indexer.state(), IndexerState::Failed);
}

#[tokio::test]
async fn test_transport_failure_drains_in_flight_batches() {
    let repository = Arc::new(MockRepository::failing_on("P250"));
    let mut indexer = ready_indexer(repository.clone(), batch_config(100, 3)).await;

    let err = indexer
        .bulk_index(documents(2000), || {})
        .await
        .unwrap_err();

    let summary = err.summary().expect("failure carries the summary");
    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.succeeded, summary.batches_written * 100);
    assert!(summary.attempted < 2000);
    assert_eq!(
        summary.attempted,
        summary.succeeded + summary.transformation_failures + summary.write_failures
            + summary.discarded
    );
    assert!(!repository.written_ids().contains(&"P250".to_string()));
    assert_eq!(indexer.state(), IndexerState::Failed);
}

#[tokio::test]
async fn test_bulk_index_rejected_before_index_is_ready() {
    let repository = Arc::new(MockRepository::new());
    let mut indexer = Indexer::new(repository.clone(), IndexerConfig::default()).unwrap();

    let result = indexer.bulk_index(documents(10), || {}).await;

    assert!(matches!(
        result,
        Err(IndexerError::InvalidState {
            state: IndexerState::Idle,
            ..
        })
    ));
    assert!(repository.batch_sizes().is_empty());
}

#[tokio::test]
async fn test_create_index_keeps_existing_index() {
    let repository = Arc::new(MockRepository::existing());
    let mut indexer = Indexer::new(repository.clone(), IndexerConfig::default()).unwrap();

    indexer.create_index(false).await.unwrap();
    indexer.create_index(false).await.unwrap();

    assert_eq!(repository.calls(), vec!["exists", "exists"]);
    assert_eq!(indexer.state(), IndexerState::IndexReady);
}

#[tokio::test]
async fn test_create_index_creates_missing_index() {
    let repository = Arc::new(MockRepository::new());
    let mut indexer = Indexer::new(repository.clone(), IndexerConfig::default()).unwrap();

    indexer.create_index(false).await.unwrap();
    indexer.create_index(false).await.unwrap();

    assert_eq!(repository.calls(), vec!["exists", "create", "exists"]);
}

#[tokio::test]
async fn test_create_index_with_delete_always_recreates() {
    let repository = Arc::new(MockRepository::existing());
    let mut indexer = Indexer::new(repository.clone(), IndexerConfig::default()).unwrap();

    indexer.create_index(true).await.unwrap();
    indexer.create_index(true).await.unwrap();

    assert_eq!(
        repository.calls(),
        vec!["delete", "create", "delete", "create"]
    );
    assert_eq!(indexer.state(), IndexerState::IndexReady);
}

fn product_record() -> RawRecord {
    RawRecord::from_json_line(
        &product_schema(),
        0,
        r#"{"product_id":"B000AAA","product_title":"<b>Cast iron</b> pan","product_description":"Pre-seasoned<br>26cm","product_bullet_point":"Oven safe","product_brand":"Lodge","product_color_name":"Black","product_locale":"us"}"#,
    )
    .unwrap()
}

fn empty_default() -> MissingPolicy {
    MissingPolicy::Default(Value::String(String::new()))
}

#[test]
fn test_pipeline_identifier_matches_record() {
    let pipeline = product_pipeline().unwrap();
    let record = product_record();

    let first = pipeline.apply_pipelines(&record).unwrap();
    let second = pipeline.apply_pipelines(&record).unwrap();

    assert_eq!(first.id(), "B000AAA");
    assert_eq!(first, second);
    assert_eq!(first.get(PRODUCT_TITLE), Some(&json!("<b>Cast iron</b> pan")));
    assert_eq!(first.get(PRODUCT_DESCRIPTION), Some(&json!("Pre-seasoned 26cm")));
}

#[test]
fn test_reordering_independent_stages_yields_identical_document() {
    let reordered: Vec<Box<dyn PipelineStage>> = vec![
        Box::new(StripMarkupStage::new(PRODUCT_BULLET_POINT, empty_default())),
        Box::new(CopyFieldStage::new(PRODUCT_LOCALE, MissingPolicy::Default(Value::Null))),
        Box::new(CopyFieldStage::new(
            PRODUCT_COLOR_NAME,
            MissingPolicy::Default(Value::Null),
        )),
        Box::new(LookupStage::new(
            PRODUCT_LOCALE,
            PRODUCT_LANGUAGE,
            locale_languages(),
        )),
        Box::new(StripMarkupStage::new(PRODUCT_DESCRIPTION, empty_default())),
        Box::new(CopyFieldStage::new(PRODUCT_BRAND, MissingPolicy::Default(Value::Null))),
        Box::new(CopyFieldStage::new(PRODUCT_TITLE, MissingPolicy::Fail)),
        Box::new(IdentifierStage::new(PRODUCT_ID)),
        Box::new(ConcatFieldsStage::new(
            [
                PRODUCT_TITLE,
                PRODUCT_BRAND,
                PRODUCT_DESCRIPTION,
                PRODUCT_BULLET_POINT,
            ],
            SEARCH_TEXT,
            " ",
        )),
    ];

    let default = PipelineManager::new(product_stages()).unwrap();
    let reordered = PipelineManager::new(reordered).unwrap();
    let record = product_record();

    assert_eq!(
        default.apply_pipelines(&record).unwrap(),
        reordered.apply_pipelines(&record).unwrap()
    );
}

#[test]
fn test_reordering_dependent_stages_is_rejected() {
    let mut stages = product_stages();
    // Move the search_text stage to the front.
    let concat = stages.pop().unwrap();
    stages.insert(0, concat);

    match PipelineManager::new(stages) {
        Err(PipelineError::UnsatisfiedDependency { stage, field }) => {
            assert_eq!(stage, SEARCH_TEXT);
            assert_eq!(field, PRODUCT_TITLE);
        }
        Err(other) => panic!("Expected UnsatisfiedDependency, got {:?}", other),
        Ok(_) => panic!("Expected UnsatisfiedDependency, got a pipeline"),
    }
}

const VALID_LINE: &str = r#"{"product_id":"ID","product_title":"Kettle","product_description":"<p>Fast</p>","product_bullet_point":null,"product_brand":"Acme","product_color_name":null,"product_locale":"jp"}"#;

fn product_line(id: &str) -> String {
    VALID_LINE.replace("\"ID\"", &format!("\"{}\"", id))
}

async fn write_products(lines: &[String]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("products-{}.json", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, lines.join("\n")).await.unwrap();
    path
}

fn orchestrator(
    path: &std::path::Path,
    repository: Arc<MockRepository>,
    config: IndexerConfig,
) -> Orchestrator {
    let indexer = Indexer::new(repository, config).unwrap();
    Orchestrator::new(
        JsonlRecordSource::new(path, product_schema()),
        product_pipeline().unwrap(),
        indexer,
        OrchestratorConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_orchestrator_full_run() {
    let mut lines: Vec<String> = (0..25).map(|n| product_line(&format!("B{:03}", n))).collect();
    lines.insert(10, String::new());
    let path = write_products(&lines).await;

    let repository = Arc::new(MockRepository::new());
    let mut orchestrator = orchestrator(&path, repository.clone(), batch_config(10, 2));

    let progress = AtomicUsize::new(0);
    let result = timeout(
        Duration::from_secs(5),
        orchestrator.run_until(
            || {
                progress.fetch_add(1, Ordering::SeqCst);
            },
            future::pending(),
        ),
    )
    .await
    .unwrap();

    let summary = result.unwrap();
    assert_eq!(summary.attempted, 25);
    assert_eq!(summary.succeeded, 25);
    assert_eq!(progress.load(Ordering::SeqCst), 25);
    let mut sizes = repository.batch_sizes();
    sizes.sort();
    assert_eq!(sizes, vec![5, 10, 10]);
    assert_eq!(repository.calls(), vec!["exists", "create"]);
    assert_eq!(orchestrator.indexer().state(), IndexerState::Finished);

    tokio::fs::remove_file(&path).await.unwrap();
}

#[tokio::test]
async fn test_orchestrator_stops_on_schema_mismatch() {
    let mut lines: Vec<String> = (0..5).map(|n| product_line(&format!("B{:03}", n))).collect();
    lines.push(r#"{"product_id":"B999","title":"renamed column"}"#.to_string());
    lines.extend((5..10).map(|n| product_line(&format!("B{:03}", n))));
    let path = write_products(&lines).await;

    let repository = Arc::new(MockRepository::new());
    let mut orchestrator = orchestrator(&path, repository.clone(), batch_config(3, 1));

    let err = orchestrator
        .run_until(|| {}, future::pending())
        .await
        .unwrap_err();

    match &err {
        IngestError::SourceAborted { summary, source } => {
            assert!(matches!(source, SourceError::Record(_)));
            assert_eq!(summary.attempted, 5);
            assert_eq!(summary.succeeded, 5);
        }
        other => panic!("Expected SourceAborted, got {:?}", other),
    }
    assert_eq!(err.summary().map(|s| s.succeeded), Some(5));
    assert_eq!(repository.written_ids().len(), 5);

    tokio::fs::remove_file(&path).await.unwrap();
}

#[tokio::test]
async fn test_orchestrator_shutdown_stops_reading() {
    let lines: Vec<String> = (0..50).map(|n| product_line(&format!("B{:03}", n))).collect();
    let path = write_products(&lines).await;

    let repository = Arc::new(MockRepository::new());
    let mut orchestrator = orchestrator(&path, repository.clone(), batch_config(10, 1));

    let summary = orchestrator
        .run_until(|| {}, future::ready(()))
        .await
        .unwrap();

    assert_eq!(summary.attempted, 0);
    assert!(repository.batch_sizes().is_empty());
    assert_eq!(orchestrator.indexer().state(), IndexerState::Finished);

    tokio::fs::remove_file(&path).await.unwrap();
}

#[tokio::test]
async fn test_orchestrator_index_creation_failure_does_not_stream() {
    let lines = vec![product_line("B001")];
    let path = write_products(&lines).await;

    struct BrokenRepository;

    #[async_trait::async_trait]
    impl IndexRepository for BrokenRepository {
        fn index_name(&self) -> &str {
            "broken"
        }

        async fn index_exists(&self) -> Result<bool, SearchIndexError> {
            Ok(false)
        }

        async fn delete_index(&self) -> Result<(), SearchIndexError> {
            Ok(())
        }

        async fn create_index(&self) -> Result<(), SearchIndexError> {
            Err(SearchIndexError::index_creation("invalid mapping"))
        }

        async fn bulk_write(
            &self,
            _documents: &[IndexableDocument],
        ) -> Result<BatchResult, SearchIndexError> {
            panic!("bulk_write must not be called");
        }
    }

    let indexer = Indexer::new(Arc::new(BrokenRepository), IndexerConfig::default()).unwrap();
    let mut orchestrator = Orchestrator::new(
        JsonlRecordSource::new(&path, product_schema()),
        product_pipeline().unwrap(),
        indexer,
        OrchestratorConfig::default(),
    )
    .unwrap();

    let err = orchestrator
        .run_until(|| {}, future::pending())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::IndexerError(IndexerError::IndexCreation(_))
    ));
    assert_eq!(orchestrator.indexer().state(), IndexerState::Failed);

    tokio::fs::remove_file(&path).await.unwrap();
}
