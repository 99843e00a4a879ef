//! In-memory collaborators for exercising the engine without a network.
//!
//! Compiled for this crate's own tests and, behind the `test-support`
//! feature, for integration tests and downstream crates.
//!
//! ```rust,ignore
//! let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
//! store.push_batch_reply(BatchReply::Fail(http_error(429, Some(2))));
//! ```

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::lists::{
    BatchEntry, BatchEntryResult, ColumnSpec, ItemPage, ItemWrite, ListStore, RemoteColumn,
    RemoteItem, RemoteList,
};
use bridge_traits::time::Sleeper;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Field that makes any batch carrying it fail with a top-level 500.
pub const POISON_FIELD: &str = "Poison";

// ============================================================================
// Sleeper
// ============================================================================

/// Records requested delays and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.delays).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.delays).push(duration);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn http_error(status: u16, retry_after_secs: Option<u64>) -> BridgeError {
    BridgeError::Http {
        status,
        retry_after_secs,
        message: format!("status {}", status),
    }
}

// ============================================================================
// List Store
// ============================================================================

/// Scripted answer for one `submit_batch` call.
pub enum BatchReply {
    /// Top-level failure; nothing is applied
    Fail(BridgeError),
    /// Override sub-response statuses by entry position; the rest apply
    Statuses(Vec<(usize, u16, Option<u64>)>),
}

#[derive(Default)]
struct State {
    lists: Vec<RemoteList>,
    columns: Vec<RemoteColumn>,
    items: Vec<RemoteItem>,
    next_id: u64,
    fail_find: bool,
    failing_pages: Vec<usize>,
    failing_columns: HashSet<String>,
    batch_replies: VecDeque<BatchReply>,
    list_items_calls: usize,
    create_column_calls: Vec<String>,
    created_lists: usize,
    submitted: Vec<Vec<BatchEntry>>,
    writes: Vec<ItemWrite>,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("item-{}", self.next_id)
    }

    fn apply(&mut self, write: &ItemWrite) -> u16 {
        self.writes.push(write.clone());
        match write {
            ItemWrite::Create { fields } => {
                let id = self.next_id();
                self.items.push(RemoteItem {
                    id,
                    fields: fields.clone(),
                });
                201
            }
            ItemWrite::Update { item_id, fields } => {
                match self.items.iter_mut().find(|item| &item.id == item_id) {
                    Some(item) => {
                        item.fields.extend(fields.clone());
                        200
                    }
                    None => 404,
                }
            }
            ItemWrite::Delete { item_id } => {
                let before = self.items.len();
                self.items.retain(|item| &item.id != item_id);
                if self.items.len() < before {
                    204
                } else {
                    404
                }
            }
        }
    }
}

/// List store kept in memory, with scripted failures and in-flight tracking.
#[derive(Default)]
pub struct MemoryListStore {
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryListStore {
    pub fn with_list(id: &str, display_name: &str) -> Self {
        let store = Self::default();
        store.state().lists.push(RemoteList {
            id: id.to_string(),
            display_name: display_name.to_string(),
        });
        store
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    pub fn add_column(&self, name: &str) {
        self.state().columns.push(RemoteColumn {
            name: name.to_string(),
            display_name: Some(name.to_string()),
            kind: None,
        });
    }

    /// Stores an item and returns its generated id (`item-1`, `item-2`, ...).
    pub fn add_item(&self, fields: serde_json::Value) -> String {
        let mut state = self.state();
        let id = state.next_id();
        state.items.push(RemoteItem {
            id: id.clone(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        });
        id
    }

    pub fn fail_find(&self) {
        self.state().fail_find = true;
    }

    /// Fail the `index`-th (0-based) page request with a 500.
    pub fn fail_page(&self, index: usize) {
        self.state().failing_pages.push(index);
    }

    pub fn fail_column(&self, name: &str) {
        self.state().failing_columns.insert(name.to_string());
    }

    pub fn push_batch_reply(&self, reply: BatchReply) {
        self.state().batch_replies.push_back(reply);
    }

    /// Top-level statuses for the next `submit_batch` calls. A 2xx lets the
    /// batch apply normally.
    pub fn script_batch_statuses(&self, statuses: &[u16]) {
        let mut state = self.state();
        for &status in statuses {
            let reply = if (200..300).contains(&status) {
                BatchReply::Statuses(Vec::new())
            } else {
                BatchReply::Fail(http_error(status, None))
            };
            state.batch_replies.push_back(reply);
        }
    }

    pub fn items(&self) -> Vec<RemoteItem> {
        self.state().items.clone()
    }

    pub fn item_count(&self) -> usize {
        self.state().items.len()
    }

    /// Every write applied, in order.
    pub fn writes(&self) -> Vec<ItemWrite> {
        self.state().writes.clone()
    }

    /// Entries of every `submit_batch` call, including failed ones.
    pub fn submitted(&self) -> Vec<Vec<BatchEntry>> {
        self.state().submitted.clone()
    }

    pub fn batch_calls(&self) -> usize {
        self.state().submitted.len()
    }

    pub fn list_items_calls(&self) -> usize {
        self.state().list_items_calls
    }

    /// Names passed to `create_column`, one per attempt.
    pub fn create_column_calls(&self) -> Vec<String> {
        self.state().create_column_calls.clone()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.state().columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn created_lists(&self) -> usize {
        self.state().created_lists
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn is_poisoned(entries: &[BatchEntry]) -> bool {
    entries.iter().any(|entry| match &entry.write {
        ItemWrite::Create { fields } | ItemWrite::Update { fields, .. } => {
            fields.contains_key(POISON_FIELD)
        }
        ItemWrite::Delete { .. } => false,
    })
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn find_list(&self, _token: &str, display_name: &str) -> Result<Option<RemoteList>> {
        let state = self.state();
        if state.fail_find {
            return Err(http_error(403, None));
        }
        Ok(state
            .lists
            .iter()
            .find(|list| list.display_name == display_name)
            .cloned())
    }

    async fn create_list(
        &self,
        _token: &str,
        display_name: &str,
        columns: &[ColumnSpec],
    ) -> Result<RemoteList> {
        let mut state = self.state();
        state.created_lists += 1;
        let list = RemoteList {
            id: "list-new".to_string(),
            display_name: display_name.to_string(),
        };
        state.lists.push(list.clone());
        state.columns.extend(columns.iter().map(|spec| RemoteColumn {
            name: spec.name.clone(),
            display_name: spec.display_name.clone(),
            kind: Some(spec.kind),
        }));
        Ok(list)
    }

    async fn list_columns(&self, _token: &str, _list_id: &str) -> Result<Vec<RemoteColumn>> {
        Ok(self.state().columns.clone())
    }

    async fn create_column(
        &self,
        _token: &str,
        _list_id: &str,
        column: &ColumnSpec,
    ) -> Result<RemoteColumn> {
        let mut state = self.state();
        state.create_column_calls.push(column.name.clone());
        if state.failing_columns.contains(&column.name) {
            return Err(http_error(400, None));
        }

        let created = RemoteColumn {
            name: column.name.clone(),
            display_name: Some(
                column
                    .display_name
                    .clone()
                    .unwrap_or_else(|| column.name.clone()),
            ),
            kind: Some(column.kind),
        };
        state.columns.push(created.clone());
        Ok(created)
    }

    async fn list_items(
        &self,
        _token: &str,
        _list_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ItemPage> {
        let mut state = self.state();
        let call = state.list_items_calls;
        state.list_items_calls += 1;
        if state.failing_pages.contains(&call) {
            return Err(http_error(500, None));
        }

        let offset: usize = match cursor {
            Some(cursor) => cursor
                .parse()
                .map_err(|_| BridgeError::OperationFailed(format!("bad cursor '{}'", cursor)))?,
            None => 0,
        };
        let end = (offset + page_size as usize).min(state.items.len());
        Ok(ItemPage {
            items: state.items[offset..end].to_vec(),
            next_cursor: (end < state.items.len()).then(|| end.to_string()),
        })
    }

    async fn submit_batch(
        &self,
        _token: &str,
        _list_id: &str,
        entries: &[BatchEntry],
    ) -> Result<Vec<BatchEntryResult>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        core_async::task::yield_now().await;
        core_async::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state();
        state.submitted.push(entries.to_vec());

        let overrides = match state.batch_replies.pop_front() {
            Some(BatchReply::Fail(error)) => return Err(error),
            Some(BatchReply::Statuses(statuses)) => statuses,
            None => Vec::new(),
        };
        if is_poisoned(entries) {
            return Err(http_error(500, None));
        }

        Ok(entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let scripted = overrides.iter().find(|(index, _, _)| *index == position);
                let (status, retry_after_secs) = match scripted {
                    Some((_, status, hint)) => (*status, *hint),
                    None => (state.apply(&entry.write), None),
                };
                BatchEntryResult {
                    id: entry.id.clone(),
                    status,
                    retry_after_secs,
                    message: (status >= 400).then(|| format!("status {}", status)),
                }
            })
            .collect())
    }
}
