//! # Engine Configuration
//!
//! Explicit configuration for the list sync engine.
//!
//! ## Overview
//!
//! Every tunable the engine reads (batch size, concurrency, retry limits, page
//! size, endpoints) lives on one [`EngineConfig`] value that is handed to the
//! sync pipeline's constructor. There is no module-level state: two pipelines
//! with different configs can run side by side.
//!
//! The builder validates every value and fails fast with an actionable message.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .site_id("contoso.sharepoint.com,1234,5678")
//!     .default_concurrency(2)
//!     .build()?;
//! ```
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - injected explicitly, or defaulted to `ReqwestHttpClient`
//!   when the `desktop-shims` feature is enabled

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, MAX_COMPOSITE_REQUESTS};
use std::sync::Arc;
use std::time::Duration;

/// Default REST endpoint of the list store
pub const DEFAULT_API_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default permission scope requested from the auth provider
pub const DEFAULT_SCOPE: &str = "Sites.Manage.All";

/// Largest page size the list endpoint accepts
pub const MAX_PAGE_SIZE: u32 = 5000;

/// Engine configuration.
///
/// Use [`EngineConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct EngineConfig {
    /// Base URL of the list store REST API (no trailing slash)
    pub api_base_url: String,

    /// Identifier of the site (store) that owns the lists
    pub site_id: String,

    /// Operations per composite request, at most [`MAX_COMPOSITE_REQUESTS`]
    pub max_batch_size: usize,

    /// Concurrent batch workers used when a job does not override it
    pub default_concurrency: usize,

    /// Items requested per page while snapshotting a list
    pub page_size: u32,

    /// Attempts per batch before it is recorded as failed
    pub retry_max_attempts: u32,

    /// Backoff base used when the server sends no `Retry-After`
    pub retry_default_hint_secs: u64,

    /// Attempts per column creation
    pub column_retry_attempts: u32,

    /// Fixed pause between column creation attempts
    pub column_retry_delay: Duration,

    /// Per-request timeout applied by connectors
    pub request_timeout: Duration,

    /// Scopes requested from the auth provider
    pub scopes: Vec<String>,

    /// HTTP transport for connectors
    pub http_client: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_base_url", &self.api_base_url)
            .field("site_id", &self.site_id)
            .field("max_batch_size", &self.max_batch_size)
            .field("default_concurrency", &self.default_concurrency)
            .field("page_size", &self.page_size)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_default_hint_secs", &self.retry_default_hint_secs)
            .field("column_retry_attempts", &self.column_retry_attempts)
            .field("column_retry_delay", &self.column_retry_delay)
            .field("request_timeout", &self.request_timeout)
            .field("scopes", &self.scopes)
            .field("http_client", &"HttpClient { ... }")
            .finish()
    }
}

impl EngineConfig {
    /// Creates a new builder with default tunables.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Site id and base URL are not empty
    /// - Batch size is within `1..=MAX_COMPOSITE_REQUESTS`
    /// - Concurrency and attempt counts are at least 1
    /// - Page size is within `1..=MAX_PAGE_SIZE`
    pub fn validate(&self) -> Result<()> {
        if self.site_id.trim().is_empty() {
            return Err(Error::Config("Site id cannot be empty".to_string()));
        }

        if self.api_base_url.trim().is_empty() {
            return Err(Error::Config("API base URL cannot be empty".to_string()));
        }

        if self.max_batch_size == 0 || self.max_batch_size > MAX_COMPOSITE_REQUESTS {
            return Err(Error::InvalidValue {
                field: "max_batch_size".to_string(),
                message: format!(
                    "must be between 1 and {} (composite request limit), got {}",
                    MAX_COMPOSITE_REQUESTS, self.max_batch_size
                ),
            });
        }

        if self.default_concurrency == 0 {
            return Err(Error::InvalidValue {
                field: "default_concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::InvalidValue {
                field: "page_size".to_string(),
                message: format!("must be between 1 and {}", MAX_PAGE_SIZE),
            });
        }

        if self.retry_max_attempts == 0 {
            return Err(Error::InvalidValue {
                field: "retry_max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.column_retry_attempts == 0 {
            return Err(Error::InvalidValue {
                field: "column_retry_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.scopes.is_empty() {
            return Err(Error::Config(
                "At least one permission scope is required".to_string(),
            ));
        }

        Ok(())
    }

    /// URL of the site that owns the lists, e.g. `{base}/sites/{site_id}`
    pub fn site_url(&self) -> String {
        format!(
            "{}/sites/{}",
            self.api_base_url.trim_end_matches('/'),
            self.site_id
        )
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Other hosts: inject an HttpClient with EngineConfigBuilder::http_client."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout)
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

/// Builder for [`EngineConfig`].
#[derive(Default)]
pub struct EngineConfigBuilder {
    api_base_url: Option<String>,
    site_id: Option<String>,
    max_batch_size: Option<usize>,
    default_concurrency: Option<usize>,
    page_size: Option<u32>,
    retry_max_attempts: Option<u32>,
    retry_default_hint_secs: Option<u64>,
    column_retry_attempts: Option<u32>,
    column_retry_delay: Option<Duration>,
    request_timeout: Option<Duration>,
    scopes: Option<Vec<String>>,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl EngineConfigBuilder {
    /// Sets the REST base URL. Default: [`DEFAULT_API_BASE_URL`]
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Sets the site (store) id. Required.
    pub fn site_id(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    /// Operations per composite request. Default: 20
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    /// Concurrent batch workers. Default: 4
    pub fn default_concurrency(mut self, workers: usize) -> Self {
        self.default_concurrency = Some(workers);
        self
    }

    /// Items per page when listing. Default: 200
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Attempts per batch. Default: 5
    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.retry_max_attempts = Some(attempts);
        self
    }

    /// Backoff base in seconds when no `Retry-After` is sent. Default: 5
    pub fn retry_default_hint_secs(mut self, secs: u64) -> Self {
        self.retry_default_hint_secs = Some(secs);
        self
    }

    /// Attempts per column creation. Default: 3
    pub fn column_retry_attempts(mut self, attempts: u32) -> Self {
        self.column_retry_attempts = Some(attempts);
        self
    }

    /// Pause between column creation attempts. Default: 1s
    pub fn column_retry_delay(mut self, delay: Duration) -> Self {
        self.column_retry_delay = Some(delay);
        self
    }

    /// Per-request timeout. Default: 30s
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Scopes requested from the auth provider. Default: [`DEFAULT_SCOPE`]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, `ReqwestHttpClient` is used when the `desktop-shims`
    /// feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The site id is missing
    /// - Any tunable is out of range
    /// - No HTTP client is available
    pub fn build(self) -> Result<EngineConfig> {
        let site_id = self.site_id.ok_or_else(|| {
            Error::Config(
                "Site id is required. Use .site_id() to identify the store that owns the lists."
                    .to_string(),
            )
        })?;

        let request_timeout = self.request_timeout.unwrap_or(Duration::from_secs(30));

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let config = EngineConfig {
            api_base_url: self
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            site_id,
            max_batch_size: self.max_batch_size.unwrap_or(MAX_COMPOSITE_REQUESTS),
            default_concurrency: self.default_concurrency.unwrap_or(4),
            page_size: self.page_size.unwrap_or(200),
            retry_max_attempts: self.retry_max_attempts.unwrap_or(5),
            retry_default_hint_secs: self.retry_default_hint_secs.unwrap_or(5),
            column_retry_attempts: self.column_retry_attempts.unwrap_or(3),
            column_retry_delay: self.column_retry_delay.unwrap_or(Duration::from_secs(1)),
            request_timeout,
            scopes: self
                .scopes
                .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]),
            http_client,
        };

        config.validate()?;
        Ok(config)
    }
}
