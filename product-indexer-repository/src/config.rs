//! Connection configuration for the OpenSearch repository.

use std::time::Duration;

/// Default request timeout for the OpenSearch transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the search backend.
///
/// These are opaque to the indexing core: they are handed to the repository at
/// construction and never inspected afterwards.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// The OpenSearch server URL (e.g., "http://localhost:9200").
    pub url: String,
    /// Optional basic-auth username.
    pub username: Option<String>,
    /// Optional basic-auth password.
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum number of documents allowed in a single bulk request.
    ///
    /// `None` disables the limit. Defaults to 1000.
    pub max_batch_size: Option<usize>,
}

impl ConnectionConfig {
    /// Create a config for the given URL with default timeout and batch limit.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            timeout: DEFAULT_TIMEOUT,
            max_batch_size: Some(1000),
        }
    }

    /// Set basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom bulk request size limit.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size);
        self
    }

    /// Basic-auth credentials, if both parts are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}
