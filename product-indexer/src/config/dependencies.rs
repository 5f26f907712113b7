//! Dependency initialization and wiring for the product indexer.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use product_indexer_repository::opensearch::{IndexConfig, DEFAULT_INDEX_NAME};
use product_indexer_repository::{ConnectionConfig, IndexRepository, OpenSearchRepository};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::indexer::{Indexer, IndexerConfig, DEFAULT_BATCH_SIZE};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::pipeline::{product_pipeline, product_schema};
use crate::source::JsonlRecordSource;
use crate::IndexingError;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default location of the product catalogue.
const DEFAULT_PRODUCTS_FILE: &str = "./esci-raw-jsonl/products/esci-data-products-jp.json";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry the connection at a fixed interval until successful.
    Retry,
}

impl ConnectionMode {
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "retry".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Settings of one indexing run, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub opensearch_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
    pub index_name: String,
    pub shards: u32,
    pub replicas: u32,
    pub products_file: PathBuf,
    pub delete_if_exists: bool,
    pub bulk_size: usize,
    pub max_in_flight_batches: usize,
    /// Total reported to the progress bar. Counted from the file when unset.
    pub expected_documents: Option<u64>,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_USERNAME` / `OPENSEARCH_PASSWORD`: Basic auth credentials (optional)
    /// - `OPENSEARCH_TIMEOUT_SECS`: Request timeout in seconds (default: 30)
    /// - `OPENSEARCH_CONNECTION_MODE`: Connection mode - "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - `INDEX_NAME`: Index name (default: "products")
    /// - `INDEX_SHARDS` / `INDEX_REPLICAS`: Index layout (default: 1 / 1)
    /// - `PRODUCTS_FILE`: JSON-lines product catalogue
    /// - `DELETE_IF_EXISTS`: Recreate the index before indexing (default: false)
    /// - `BULK_SIZE`: Documents per bulk request (default: 500)
    /// - `MAX_IN_FLIGHT_BATCHES`: Concurrent bulk requests (default: 1)
    /// - `EXPECTED_DOCUMENTS`: Progress total (default: number of lines in the file)
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, IndexingError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let settings = Self {
            opensearch_url: var("OPENSEARCH_URL")
                .unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()),
            username: var("OPENSEARCH_USERNAME"),
            password: var("OPENSEARCH_PASSWORD"),
            timeout: Duration::from_secs(parse_or(
                "OPENSEARCH_TIMEOUT_SECS",
                var("OPENSEARCH_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )?),
            connection_mode: ConnectionMode::parse(var("OPENSEARCH_CONNECTION_MODE")),
            retry_interval: Duration::from_secs(parse_or(
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                var("OPENSEARCH_RETRY_INTERVAL_SECS"),
                DEFAULT_RETRY_INTERVAL_SECS,
            )?),
            index_name: var("INDEX_NAME").unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            shards: parse_or("INDEX_SHARDS", var("INDEX_SHARDS"), 1)?,
            replicas: parse_or("INDEX_REPLICAS", var("INDEX_REPLICAS"), 1)?,
            products_file: var("PRODUCTS_FILE")
                .unwrap_or_else(|| DEFAULT_PRODUCTS_FILE.to_string())
                .into(),
            delete_if_exists: parse_bool("DELETE_IF_EXISTS", var("DELETE_IF_EXISTS"))?,
            bulk_size: parse_or("BULK_SIZE", var("BULK_SIZE"), DEFAULT_BATCH_SIZE)?,
            max_in_flight_batches: parse_or(
                "MAX_IN_FLIGHT_BATCHES",
                var("MAX_IN_FLIGHT_BATCHES"),
                1,
            )?,
            expected_documents: var("EXPECTED_DOCUMENTS")
                .map(|value| parse("EXPECTED_DOCUMENTS", &value))
                .transpose()?,
        };
        settings.credentials()?;
        Ok(settings)
    }

    /// Basic-auth credentials. Setting only one of the two variables is an error.
    pub fn credentials(&self) -> Result<Option<(&str, &str)>, IndexingError> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Some((username, password))),
            (None, None) => Ok(None),
            (Some(_), None) => Err(IndexingError::config(
                "OPENSEARCH_USERNAME is set but OPENSEARCH_PASSWORD is missing",
            )),
            (None, Some(_)) => Err(IndexingError::config(
                "OPENSEARCH_PASSWORD is set but OPENSEARCH_USERNAME is missing",
            )),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, IndexingError> {
    value
        .trim()
        .parse()
        .map_err(|_| IndexingError::config(format!("Invalid value for {}: '{}'", key, value)))
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, IndexingError> {
    match value {
        Some(value) => parse(key, &value),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Result<bool, IndexingError> {
    match value.as_deref().map(|v| v.trim().to_lowercase()).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(IndexingError::config(format!(
            "Invalid value for {}: expected a boolean",
            key
        ))),
    }
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
    /// Number of documents the run is expected to process.
    pub expected_documents: u64,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If the settings are invalid, or the connection
    ///   fails in fail-fast mode
    pub async fn new() -> Result<Self, IndexingError> {
        Self::from_settings(Settings::from_env()?).await
    }

    pub async fn from_settings(settings: Settings) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            index = %settings.index_name,
            products_file = %settings.products_file.display(),
            connection_mode = ?settings.connection_mode,
            retry_interval_secs = settings.retry_interval.as_secs(),
            bulk_size = settings.bulk_size,
            max_in_flight_batches = settings.max_in_flight_batches,
            delete_if_exists = settings.delete_if_exists,
            "Initializing dependencies"
        );

        let mut connection = ConnectionConfig::new(settings.opensearch_url.clone())
            .with_timeout(settings.timeout)
            .with_max_batch_size(settings.bulk_size);
        if let Some((username, password)) = settings.credentials()? {
            connection = connection.with_credentials(username, password);
        }
        let index_config = IndexConfig::new(settings.index_name.clone())
            .with_shards(settings.shards, settings.replicas);

        let repository = Self::connect_to_opensearch(
            &connection,
            index_config,
            settings.connection_mode,
            settings.retry_interval,
        )
        .await?;

        info!("OpenSearch connection established");

        let source = JsonlRecordSource::new(settings.products_file.clone(), product_schema());
        let expected_documents = match settings.expected_documents {
            Some(expected) => expected,
            None => source.count_records().await.map_err(|e| {
                IndexingError::config(format!("Failed to read products file: {}", e))
            })?,
        };

        let pipeline = product_pipeline()
            .map_err(|e| IndexingError::config(format!("Invalid product pipeline: {}", e)))?;

        let indexer = Indexer::new(
            Arc::new(repository),
            IndexerConfig {
                batch_size: settings.bulk_size,
                max_in_flight_batches: settings.max_in_flight_batches,
            },
        )
        .map_err(|e| IndexingError::config(e.to_string()))?;

        let orchestrator = Orchestrator::new(
            source,
            pipeline,
            indexer,
            OrchestratorConfig {
                delete_if_exists: settings.delete_if_exists,
            },
        )?;

        Ok(Self {
            orchestrator,
            expected_documents,
        })
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        connection: &ConnectionConfig,
        index_config: IndexConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchRepository, IndexingError> {
        loop {
            match Self::try_connect_opensearch(connection, index_config.clone()).await {
                Ok(repository) => return Ok(repository),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(IndexingError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %connection.url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Build the repository and check that the cluster answers.
    async fn try_connect_opensearch(
        connection: &ConnectionConfig,
        index_config: IndexConfig,
    ) -> Result<OpenSearchRepository, IndexingError> {
        let repository = OpenSearchRepository::new(connection, index_config).map_err(|e| {
            IndexingError::config(format!("Failed to create OpenSearch repository: {}", e))
        })?;

        repository
            .index_exists()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch is not reachable: {}", e)))?;

        Ok(repository)
    }
}
