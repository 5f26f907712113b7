//! OpenSearch repository implementation.
//!
//! This module provides the concrete implementation of `IndexRepository`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    http::{
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts},
    BulkParts, OpenSearch,
};
use product_indexer_shared::IndexableDocument;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::ConnectionConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::IndexRepository;
use crate::opensearch::bulk::{build_bulk_body, parse_bulk_response, BulkResponse};
use crate::opensearch::index_config::{get_index_settings, IndexConfig};
use crate::types::BatchResult;

/// OpenSearch repository implementation.
///
/// Manages the lifecycle of a single index and writes documents to it through
/// the `_bulk` API. The underlying client pools connections and is safe to use
/// from several tasks at once.
///
/// # Example
///
/// ```ignore
/// use product_indexer_repository::{ConnectionConfig, IndexRepository, OpenSearchRepository};
/// use product_indexer_repository::opensearch::IndexConfig;
///
/// let connection = ConnectionConfig::new("http://localhost:9200");
/// let repository = OpenSearchRepository::new(&connection, IndexConfig::new("products"))?;
///
/// if !repository.index_exists().await? {
///     repository.create_index().await?;
/// }
/// let result = repository.bulk_write(&documents).await?;
/// ```
pub struct OpenSearchRepository {
    client: OpenSearch,
    index_config: IndexConfig,
    max_batch_size: Option<usize>,
}

impl OpenSearchRepository {
    /// Create a new OpenSearch repository for the given connection and index.
    ///
    /// # Arguments
    ///
    /// * `connection` - URL, credentials, timeout and batch limit
    /// * `index_config` - The index name and shard layout
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchRepository)` - A new repository instance
    /// * `Err(SearchIndexError)` - If the URL is invalid or the transport cannot be built
    pub fn new(
        connection: &ConnectionConfig,
        index_config: IndexConfig,
    ) -> Result<Self, SearchIndexError> {
        if index_config.name.is_empty() {
            return Err(SearchIndexError::validation("Index name cannot be empty"));
        }

        let parsed_url = Url::parse(&connection.url)
            .map_err(|e| SearchIndexError::connection(format!("Invalid URL: {}", e)))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .timeout(connection.timeout);
        if let Some((username, password)) = connection.credentials() {
            builder = builder.auth(Credentials::Basic(
                username.to_string(),
                password.to_string(),
            ));
        }
        let transport = builder
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        info!(
            url = %connection.url,
            index = %index_config.name,
            authenticated = connection.credentials().is_some(),
            "Created OpenSearch repository"
        );

        Ok(Self {
            client: OpenSearch::new(transport),
            index_config,
            max_batch_size: connection.max_batch_size,
        })
    }

    /// Check if batch size exceeds the configured limit.
    fn validate_batch_size(&self, size: usize) -> Result<(), SearchIndexError> {
        if let Some(max) = self.max_batch_size {
            if size > max {
                return Err(SearchIndexError::batch_size_exceeded(size, max));
            }
        }
        Ok(())
    }

    /// Read the body of a failed response for error reporting.
    async fn error_body(response: Response) -> String {
        response.text().await.unwrap_or_default()
    }
}

#[async_trait]
impl IndexRepository for OpenSearchRepository {
    fn index_name(&self) -> &str {
        &self.index_config.name
    }

    async fn index_exists(&self) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[self.index_config.name.as_str()]))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        let status = response.status_code();
        match status.as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => {
                let body = Self::error_body(response).await;
                error!(status = %status, body = %body, "Index exists request failed");
                Err(SearchIndexError::index_lookup(format!(
                    "Exists check failed with status {}: {}",
                    status, body
                )))
            }
        }
    }

    #[instrument(skip(self), fields(index = %self.index_config.name))]
    async fn delete_index(&self) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[self.index_config.name.as_str()]))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        let status = response.status_code();

        // 404 is acceptable - the index may not exist
        if status.as_u16() == 404 {
            debug!("Index did not exist, nothing to delete");
            return Ok(());
        }
        if !status.is_success() {
            let body = Self::error_body(response).await;
            error!(status = %status, body = %body, "Delete index request failed");
            return Err(SearchIndexError::index_deletion(format!(
                "Delete failed with status {}: {}",
                status, body
            )));
        }

        info!("Index deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(index = %self.index_config.name))]
    async fn create_index(&self) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index_config.name))
            .body(get_index_settings(&self.index_config))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = Self::error_body(response).await;
            error!(status = %status, body = %body, "Create index request failed");
            return Err(SearchIndexError::index_creation(format!(
                "Create failed with status {}: {}",
                status, body
            )));
        }

        info!(
            shards = self.index_config.number_of_shards,
            replicas = self.index_config.number_of_replicas,
            "Index created"
        );
        Ok(())
    }

    async fn bulk_write(
        &self,
        documents: &[IndexableDocument],
    ) -> Result<BatchResult, SearchIndexError> {
        if documents.is_empty() {
            return Ok(BatchResult::default());
        }
        self.validate_batch_size(documents.len())?;

        let response = self
            .client
            .bulk(BulkParts::Index(&self.index_config.name))
            .body(build_bulk_body(documents))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = Self::error_body(response).await;
            error!(status = %status, body = %body, "Bulk request failed");
            return Err(SearchIndexError::bulk_request(format!(
                "Bulk request failed with status {}: {}",
                status, body
            )));
        }

        let bulk_response: BulkResponse = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;
        let has_errors = bulk_response.errors;

        let result = parse_bulk_response(bulk_response, documents)?;

        if has_errors {
            warn!(
                attempted = result.attempted,
                succeeded = result.succeeded,
                failed = result.failed(),
                "Bulk write completed with some failures"
            );
        } else {
            debug!(count = result.succeeded, "Bulk write succeeded");
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_url() {
        let connection = ConnectionConfig::new("not a url");
        let result = OpenSearchRepository::new(&connection, IndexConfig::default());
        assert!(matches!(result, Err(SearchIndexError::ConnectionError(_))));
    }

    #[test]
    fn test_new_rejects_empty_index_name() {
        let connection = ConnectionConfig::new("http://localhost:9200");
        let result = OpenSearchRepository::new(&connection, IndexConfig::new(""));
        assert!(matches!(result, Err(SearchIndexError::ValidationError(_))));
    }

    #[test]
    fn test_index_name() {
        let connection = ConnectionConfig::new("http://localhost:9200");
        let repository =
            OpenSearchRepository::new(&connection, IndexConfig::new("products_jp")).unwrap();
        assert_eq!(repository.index_name(), "products_jp");
    }

    #[test]
    fn test_validate_batch_size() {
        let connection = ConnectionConfig::new("http://localhost:9200").with_max_batch_size(2);
        let repository = OpenSearchRepository::new(&connection, IndexConfig::default()).unwrap();

        assert!(repository.validate_batch_size(2).is_ok());
        assert_eq!(
            repository.validate_batch_size(3).unwrap_err(),
            SearchIndexError::batch_size_exceeded(3, 2)
        );
    }

    #[tokio::test]
    async fn test_bulk_write_empty_batch_skips_request() {
        // Port 9 (discard) is never an OpenSearch node; an empty batch must not touch it.
        let connection = ConnectionConfig::new("http://127.0.0.1:9");
        let repository = OpenSearchRepository::new(&connection, IndexConfig::default()).unwrap();

        let result = repository.bulk_write(&[]).await.unwrap();
        assert_eq!(result, BatchResult::default());
    }
}
