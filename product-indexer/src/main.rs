//! Product Indexer Main Entry Point
//!
//! Reads the product catalogue and bulk indexes it into OpenSearch.

use dotenv::dotenv;
use indicatif::{ProgressBar, ProgressStyle};
use product_indexer::{Dependencies, IndexingError};
use std::env;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn from_env() -> Self {
        match env::var("LOG_FORMAT") {
            Ok(format) if format.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Initialize tracing/logging.
fn init_tracing(format: LogFormat) -> Result<(), IndexingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("product_indexer=info,product_indexer_repository=info")
    });
    let registry = tracing_subscriber::registry().with(filter);

    let initialized = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .try_init(),
    };
    initialized
        .map_err(|e| IndexingError::config(format!("Failed to initialize tracing: {}", e)))?;

    info!(
        service_name = "product-indexer",
        service_version = env!("CARGO_PKG_VERSION"),
        log_format = ?format,
        "Tracing initialized"
    );
    Ok(())
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {per_sec}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing(LogFormat::from_env())?;

    info!("Starting product indexer");

    let mut deps = match Dependencies::new().await {
        Ok(deps) => {
            info!(
                expected_documents = deps.expected_documents,
                "Dependencies initialized successfully"
            );
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    let bar = progress_bar(deps.expected_documents);
    let result = deps.orchestrator.run(|| bar.inc(1)).await;
    bar.finish_and_clear();

    match result {
        Ok(summary) => {
            info!(
                succeeded = summary.succeeded,
                expected = deps.expected_documents,
                failed = summary.failed(),
                "Product indexer completed"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Product indexer failed");
            Err(e.into())
        }
    }
}
