//! Remote List Store Abstraction
//!
//! Contract for a remote tabular list store reachable only through a paged,
//! rate-limited REST API. Connectors (e.g. the Graph lists connector) implement
//! [`ListStore`]; the sync engine consumes it without knowing URLs or wire
//! formats.
//!
//! Every call takes the bearer token explicitly. The engine acquires one token
//! per job and treats it as read-only for the job's duration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Column field values as sent to and received from the store.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Hard limit on sub-requests inside one composite call.
pub const MAX_COMPOSITE_REQUESTS: usize = 20;

/// Column data type supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Number,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Number => "number",
        }
    }
}

/// Column to create on a remote list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Internal (API) name
    pub name: String,
    /// Label shown to users; defaults to `name` at the connector
    pub display_name: Option<String>,
    pub kind: ColumnKind,
}

/// A list resolved on the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteList {
    pub id: String,
    pub display_name: String,
}

/// A column as reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteColumn {
    pub name: String,
    pub display_name: Option<String>,
    /// `None` for column types the engine does not model
    pub kind: Option<ColumnKind>,
}

impl RemoteColumn {
    /// True when either the internal or the display name equals `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.display_name.as_deref() == Some(name)
    }
}

/// One list item with its expanded fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    pub id: String,
    pub fields: FieldMap,
}

/// One page of a paged item listing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemPage {
    pub items: Vec<RemoteItem>,
    /// Opaque continuation token; `None` on the last page
    pub next_cursor: Option<String>,
}

/// A single write inside a composite request.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemWrite {
    Create { fields: FieldMap },
    Update { item_id: String, fields: FieldMap },
    Delete { item_id: String },
}

/// Sub-request of a composite call, correlated by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub id: String,
    pub write: ItemWrite,
}

/// Sub-response of a composite call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntryResult {
    pub id: String,
    pub status: u16,
    pub retry_after_secs: Option<u64>,
    /// Error message extracted from the sub-response body, if any
    pub message: Option<String>,
}

impl BatchEntryResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Remote list store trait
///
/// Mirrors the REST surface the engine relies on:
///
/// | Operation | REST call |
/// |-----------|-----------|
/// | [`find_list`](ListStore::find_list) | `GET /lists?filter=displayName eq '{name}'` |
/// | [`create_list`](ListStore::create_list) | `POST /lists` |
/// | [`list_columns`](ListStore::list_columns) | `GET /lists/{id}/columns` |
/// | [`create_column`](ListStore::create_column) | `POST /lists/{id}/columns` |
/// | [`list_items`](ListStore::list_items) | `GET /lists/{id}/items?expand=fields&top=N` |
/// | [`submit_batch`](ListStore::submit_batch) | `POST /$batch` wrapping item `POST`, `PATCH .../fields` and `DELETE` calls |
///
/// Non-2xx answers surface as [`BridgeError::Http`](crate::error::BridgeError::Http)
/// carrying the status and any `Retry-After` hint. Implementations must not
/// retry internally.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::lists::ListStore;
///
/// async fn count_items(store: &dyn ListStore, token: &str, list_id: &str) -> Result<usize> {
///     let mut total = 0;
///     let mut cursor = None;
///     loop {
///         let page = store.list_items(token, list_id, cursor.as_deref(), 200).await?;
///         total += page.items.len();
///         match page.next_cursor {
///             Some(next) => cursor = Some(next),
///             None => return Ok(total),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Look up a list by display name
    async fn find_list(&self, token: &str, display_name: &str) -> Result<Option<RemoteList>>;

    /// Create a generic list with the given initial columns
    async fn create_list(
        &self,
        token: &str,
        display_name: &str,
        columns: &[ColumnSpec],
    ) -> Result<RemoteList>;

    /// List the columns currently defined on a list
    async fn list_columns(&self, token: &str, list_id: &str) -> Result<Vec<RemoteColumn>>;

    /// Add one column to a list
    async fn create_column(
        &self,
        token: &str,
        list_id: &str,
        column: &ColumnSpec,
    ) -> Result<RemoteColumn>;

    /// Fetch one page of items; `cursor` is the previous page's continuation
    async fn list_items(
        &self,
        token: &str,
        list_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ItemPage>;

    /// Submit up to [`MAX_COMPOSITE_REQUESTS`] writes as one composite call
    ///
    /// A returned `Ok` only means the composite call itself succeeded; each
    /// entry result must be inspected for its own status.
    async fn submit_batch(
        &self,
        token: &str,
        list_id: &str,
        entries: &[BatchEntry],
    ) -> Result<Vec<BatchEntryResult>>;
}
