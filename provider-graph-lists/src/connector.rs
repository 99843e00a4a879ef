//! Graph lists API connector implementation
//!
//! Implements the `ListStore` trait for the site list endpoints.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::lists::{
    BatchEntry, BatchEntryResult, ColumnSpec, ItemPage, ItemWrite, ListStore,
    RemoteColumn, RemoteList, MAX_COMPOSITE_REQUESTS,
};
use core_runtime::config::EngineConfig;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::GraphListsError;
use crate::types::{
    BatchRequest, BatchRequestEntry, BatchResponse, Collection, ColumnDefinition,
    CreateListRequest, ErrorEnvelope, ItemResource, ListResource, ListTemplate,
};

/// Default per-request timeout
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Graph lists API connector
///
/// Implements `ListStore` for the lists of one site.
///
/// # Example
///
/// ```ignore
/// use provider_graph_lists::GraphListsConnector;
/// use bridge_traits::lists::ListStore;
///
/// let connector = GraphListsConnector::new(http_client, "https://graph.microsoft.com/v1.0", site_id);
/// let list = connector.find_list(token, "KPIs").await?;
/// ```
pub struct GraphListsConnector {
    http_client: Arc<dyn HttpClient>,

    /// API version root, without trailing slash
    base_url: String,

    site_id: String,

    request_timeout: Duration,
}

impl GraphListsConnector {
    /// Create a new connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `base_url` - API version root, e.g. `https://graph.microsoft.com/v1.0`
    /// * `site_id` - Site that owns the lists
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        site_id: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            site_id: site_id.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Create a connector from the engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            Arc::clone(&config.http_client),
            config.api_base_url.clone(),
            config.site_id.clone(),
        )
        .with_request_timeout(config.request_timeout)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Site-relative path of a list, as used inside `$batch` sub-requests
    fn list_path(&self, list_id: &str) -> String {
        format!("/sites/{}/lists/{}", self.site_id, list_id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: HttpMethod, url: String, token: &str) -> HttpRequest {
        HttpRequest::new(method, url)
            .bearer_token(token)
            .header("Accept", "application/json")
            .timeout(self.request_timeout)
    }

    /// Execute a request and turn non-2xx answers into `GraphListsError::Api`
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, GraphListsError> {
        let method = request.method;
        let response = self.http_client.execute(request).await?;

        if response.is_success() {
            return Ok(response);
        }

        let retry_after_secs = response.retry_after_secs();
        let message = Self::error_message(&response);
        warn!(
            method = method.as_str(),
            status = response.status,
            retry_after_secs,
            "Graph request failed: {}",
            message
        );

        Err(GraphListsError::Api {
            status: response.status,
            message,
            retry_after_secs,
        })
    }

    /// Extract `error.message`, falling back to the raw body
    fn error_message(response: &HttpResponse) -> String {
        match response.json::<ErrorEnvelope>() {
            Ok(envelope) if !envelope.error.message.is_empty() => match envelope.error.code {
                Some(code) => format!("{}: {}", code, envelope.error.message),
                None => envelope.error.message,
            },
            _ => String::from_utf8_lossy(&response.body).to_string(),
        }
    }

    fn parse<T: DeserializeOwned>(response: &HttpResponse) -> std::result::Result<T, GraphListsError> {
        serde_json::from_slice(&response.body)
            .map_err(|e| GraphListsError::Parse(format!("Failed to parse response: {}", e)))
    }

    /// OData string literal with embedded quotes doubled
    fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Continuation links are absolute; refuse to send the token anywhere else
    fn check_cursor(&self, cursor: &str) -> std::result::Result<(), GraphListsError> {
        if cursor.starts_with(&format!("{}/", self.base_url)) {
            Ok(())
        } else {
            Err(GraphListsError::InvalidCursor(cursor.to_string()))
        }
    }

    fn batch_request_entry(&self, list_id: &str, entry: &BatchEntry) -> BatchRequestEntry {
        let items_path = format!("{}/items", self.list_path(list_id));

        let (method, url, body) = match &entry.write {
            ItemWrite::Create { fields } => (
                HttpMethod::Post,
                items_path,
                Some(serde_json::json!({ "fields": fields })),
            ),
            ItemWrite::Update { item_id, fields } => (
                HttpMethod::Patch,
                format!("{}/{}/fields", items_path, item_id),
                Some(Value::Object(fields.clone())),
            ),
            ItemWrite::Delete { item_id } => {
                (HttpMethod::Delete, format!("{}/{}", items_path, item_id), None)
            }
        };

        let mut headers = HashMap::new();
        if body.is_some() {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }

        BatchRequestEntry {
            id: entry.id.clone(),
            method: method.as_str().to_string(),
            url,
            headers,
            body,
        }
    }
}

#[async_trait]
impl ListStore for GraphListsConnector {
    #[instrument(skip(self, token))]
    async fn find_list(&self, token: &str, display_name: &str) -> Result<Option<RemoteList>> {
        let filter = format!("displayName eq {}", Self::quote_literal(display_name));
        let url = format!(
            "{}/lists?$filter={}&$select=id,displayName",
            self.url(&format!("/sites/{}", self.site_id)),
            urlencoding::encode(&filter)
        );

        let response = self.send(self.request(HttpMethod::Get, url, token)).await?;
        let lists: Collection<ListResource> = Self::parse(&response)?;

        let found = lists.value.into_iter().next().map(RemoteList::from);
        debug!(found = found.is_some(), "List lookup finished");
        Ok(found)
    }

    #[instrument(skip(self, token, columns), fields(columns = columns.len()))]
    async fn create_list(
        &self,
        token: &str,
        display_name: &str,
        columns: &[ColumnSpec],
    ) -> Result<RemoteList> {
        info!("Creating list");

        let body = CreateListRequest {
            display_name: display_name.to_string(),
            columns: columns.iter().map(ColumnDefinition::from).collect(),
            list: ListTemplate::default(),
        };
        let url = self.url(&format!("/sites/{}/lists", self.site_id));
        let request = self.request(HttpMethod::Post, url, token).json(&body)?;

        let response = self.send(request).await?;
        let list: ListResource = Self::parse(&response)?;
        Ok(list.into())
    }

    #[instrument(skip(self, token))]
    async fn list_columns(&self, token: &str, list_id: &str) -> Result<Vec<RemoteColumn>> {
        let url = self.url(&format!("{}/columns", self.list_path(list_id)));
        let response = self.send(self.request(HttpMethod::Get, url, token)).await?;
        let columns: Collection<ColumnDefinition> = Self::parse(&response)?;

        Ok(columns.value.into_iter().map(RemoteColumn::from).collect())
    }

    #[instrument(skip(self, token, column), fields(column = %column.name))]
    async fn create_column(
        &self,
        token: &str,
        list_id: &str,
        column: &ColumnSpec,
    ) -> Result<RemoteColumn> {
        let url = self.url(&format!("{}/columns", self.list_path(list_id)));
        let request = self
            .request(HttpMethod::Post, url, token)
            .json(&ColumnDefinition::from(column))?;

        let response = self.send(request).await?;
        let created: ColumnDefinition = Self::parse(&response)?;
        Ok(created.into())
    }

    #[instrument(skip(self, token, cursor), fields(has_cursor = cursor.is_some()))]
    async fn list_items(
        &self,
        token: &str,
        list_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ItemPage> {
        let url = match cursor {
            Some(next_link) => {
                self.check_cursor(next_link)?;
                next_link.to_string()
            }
            None => format!(
                "{}?expand=fields&$top={}",
                self.url(&format!("{}/items", self.list_path(list_id))),
                page_size
            ),
        };

        let response = self.send(self.request(HttpMethod::Get, url, token)).await?;
        let page: Collection<ItemResource> = Self::parse(&response)?;

        debug!(
            items = page.value.len(),
            more = page.next_link.is_some(),
            "Fetched item page"
        );

        Ok(ItemPage {
            items: page.value.into_iter().map(Into::into).collect(),
            next_cursor: page.next_link,
        })
    }

    #[instrument(skip(self, token, entries), fields(entries = entries.len()))]
    async fn submit_batch(
        &self,
        token: &str,
        list_id: &str,
        entries: &[BatchEntry],
    ) -> Result<Vec<BatchEntryResult>> {
        if entries.len() > MAX_COMPOSITE_REQUESTS {
            return Err(bridge_traits::error::BridgeError::OperationFailed(format!(
                "Composite request holds {} entries, limit is {}",
                entries.len(),
                MAX_COMPOSITE_REQUESTS
            )));
        }

        let body = BatchRequest {
            requests: entries
                .iter()
                .map(|entry| self.batch_request_entry(list_id, entry))
                .collect(),
        };
        let request = self
            .request(HttpMethod::Post, self.url("/$batch"), token)
            .json(&body)?;

        let response = self.send(request).await?;
        let batch: BatchResponse = Self::parse(&response)?;

        let mut by_id: HashMap<String, _> = batch
            .responses
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();

        // Results come back in request order; sub-responses may arrive shuffled
        let results = entries
            .iter()
            .map(|entry| match by_id.remove(&entry.id) {
                Some(sub) => BatchEntryResult {
                    id: entry.id.clone(),
                    status: sub.status,
                    retry_after_secs: sub.retry_after_secs(),
                    message: sub.error_message(),
                },
                None => BatchEntryResult {
                    id: entry.id.clone(),
                    status: 0,
                    retry_after_secs: None,
                    message: Some("No sub-response returned".to_string()),
                },
            })
            .collect::<Vec<_>>();

        let failed = results.iter().filter(|r| !r.is_success()).count();
        debug!(failed, "Composite request answered");

        Ok(results)
    }
}
