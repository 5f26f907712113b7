//! Orchestrator module for the product indexer.
//!
//! Wires one indexing run: prepare the index, stream records from the source,
//! transform them through the pipeline and bulk index the resulting documents.

use std::future::Future;

use futures::future;
use futures::stream::StreamExt;
use tracing::{error, info, instrument, warn};

use crate::errors::{IngestError, SourceError};
use crate::indexer::{Indexer, IndexingSummary};
use crate::pipeline::PipelineManager;
use crate::source::JsonlRecordSource;

/// Configuration for the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Drop and recreate the index before indexing.
    pub delete_if_exists: bool,
}

/// Orchestrator that coordinates one indexing run.
pub struct Orchestrator {
    source: JsonlRecordSource,
    pipeline: PipelineManager,
    indexer: Indexer,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create a new orchestrator.
    ///
    /// Fails if a pipeline stage reads a column the source schema does not declare.
    pub fn new(
        source: JsonlRecordSource,
        pipeline: PipelineManager,
        indexer: Indexer,
        config: OrchestratorConfig,
    ) -> Result<Self, IngestError> {
        pipeline.validate_against(source.schema())?;
        Ok(Self {
            source,
            pipeline,
            indexer,
            config,
        })
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// Run until the source is exhausted or Ctrl-C is received.
    pub async fn run<F: FnMut()>(
        &mut self,
        on_progress: F,
    ) -> Result<IndexingSummary, IngestError> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Unable to listen for shutdown signal");
                future::pending::<()>().await;
            }
        };
        self.run_until(on_progress, ctrl_c).await
    }

    /// Run until the source is exhausted or `shutdown` completes.
    ///
    /// Shutdown stops pulling records; documents already pulled are still written.
    #[instrument(skip_all, fields(path = %self.source.path().display()))]
    pub async fn run_until<F, C>(
        &mut self,
        on_progress: F,
        shutdown: C,
    ) -> Result<IndexingSummary, IngestError>
    where
        F: FnMut(),
        C: Future<Output = ()>,
    {
        info!(
            delete_if_exists = self.config.delete_if_exists,
            stages = ?self.pipeline.stage_names(),
            "Starting product indexing run"
        );

        self.indexer
            .create_index(self.config.delete_if_exists)
            .await?;

        let records = self.source.open().await?;
        let shutdown = async {
            shutdown.await;
            info!("Received shutdown signal, no more records will be read");
        };

        let mut source_failure: Option<SourceError> = None;
        let pipeline = &self.pipeline;
        let documents = records
            .take_until(shutdown)
            .take_while(|item| {
                if let Err(e) = item {
                    source_failure = Some(e.clone());
                }
                future::ready(item.is_ok())
            })
            .filter_map(|item| future::ready(item.ok()))
            .map(|record| pipeline.apply_pipelines(&record));

        let summary = match self.indexer.bulk_index(documents, on_progress).await {
            Ok(summary) => summary,
            Err(e) => {
                if let Some(summary) = e.summary() {
                    error!(
                        "Indexed {}/{} documents before the run failed",
                        summary.succeeded, summary.attempted
                    );
                }
                return Err(e.into());
            }
        };

        if let Some(source) = source_failure {
            error!(
                error = %source,
                "Indexed {}/{} documents before the record source failed",
                summary.succeeded, summary.attempted
            );
            return Err(IngestError::SourceAborted { summary, source });
        }

        info!(
            run_id = %summary.run_id,
            "Indexed {}/{} documents",
            summary.succeeded, summary.attempted
        );
        Ok(summary)
    }
}
