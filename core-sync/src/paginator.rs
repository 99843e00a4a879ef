//! Sequential walk over a paged item listing.

use bridge_traits::lists::{ListStore, RemoteItem};
use core_async::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};

/// Walks `GET /lists/{id}/items` page by page until the store stops
/// returning a continuation cursor.
///
/// Pages are requested strictly one after another. The walk is not
/// restartable: once exhausted or failed, [`next_page`](Self::next_page)
/// keeps returning `Ok(None)`.
///
/// [`fetch_all`](Self::fetch_all) accumulates every item in memory before
/// returning, so very large lists are bounded by available memory.
pub struct CursorPaginator<'a> {
    store: &'a dyn ListStore,
    token: &'a str,
    list_id: &'a str,
    page_size: u32,
    cancellation: Option<&'a CancellationToken>,
    cursor: Option<String>,
    pages_fetched: usize,
    done: bool,
}

impl<'a> CursorPaginator<'a> {
    pub fn new(store: &'a dyn ListStore, token: &'a str, list_id: &'a str, page_size: u32) -> Self {
        Self {
            store,
            token,
            list_id,
            page_size,
            cancellation: None,
            cursor: None,
            pages_fetched: 0,
            done: false,
        }
    }

    /// Checked before every page request.
    pub fn with_cancellation(mut self, cancellation: Option<&'a CancellationToken>) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetches the next page, or `Ok(None)` once the listing is exhausted.
    ///
    /// # Errors
    ///
    /// - `SyncError::Cancelled` if cancellation was requested
    /// - `SyncError::Pagination` if the store call failed
    pub async fn next_page(&mut self) -> Result<Option<Vec<RemoteItem>>> {
        if self.done {
            return Ok(None);
        }

        if self.cancellation.is_some_and(|token| token.is_cancelled()) {
            self.done = true;
            return Err(SyncError::Cancelled);
        }

        let page = match self
            .store
            .list_items(self.token, self.list_id, self.cursor.as_deref(), self.page_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                warn!(
                    list_id = self.list_id,
                    page = self.pages_fetched + 1,
                    error = %e,
                    "Page request failed"
                );
                return Err(SyncError::Pagination(format!(
                    "page {} of list {}: {}",
                    self.pages_fetched + 1,
                    self.list_id,
                    e
                )));
            }
        };

        self.pages_fetched += 1;
        self.cursor = page.next_cursor;
        self.done = self.cursor.is_none();

        debug!(
            page = self.pages_fetched,
            items = page.items.len(),
            more = !self.done,
            "Fetched page"
        );

        Ok(Some(page.items))
    }

    /// Collects every page. A failure on any page discards what was read.
    #[instrument(skip(self), fields(list_id = self.list_id))]
    pub async fn fetch_all(mut self) -> Result<Vec<RemoteItem>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }

        debug!(pages = self.pages_fetched, items = items.len(), "Listing exhausted");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryListStore;
    use serde_json::json;

    fn store_with_items(n: usize) -> MemoryListStore {
        let store = MemoryListStore::with_list("l", "KPIs");
        for i in 0..n {
            store.add_item(json!({ "Seq": i }));
        }
        store
    }

    #[tokio::test]
    async fn test_three_pages_three_requests() {
        let store = store_with_items(25);

        let items = CursorPaginator::new(&store, "tok", "l", 10)
            .fetch_all()
            .await
            .unwrap();

        assert_eq!(store.list_items_calls(), 3);
        assert_eq!(items.len(), 25);
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"item-1"));
        assert_eq!(ids.last(), Some(&"item-25"));
    }

    #[tokio::test]
    async fn test_empty_list_is_one_request() {
        let store = store_with_items(0);

        let items = CursorPaginator::new(&store, "tok", "l", 10)
            .fetch_all()
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(store.list_items_calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_discards_partial_results() {
        let store = store_with_items(25);
        store.fail_page(1);

        let err = CursorPaginator::new(&store, "tok", "l", 10)
            .fetch_all()
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Pagination(_)));
        assert_eq!(store.list_items_calls(), 2);
    }

    #[tokio::test]
    async fn test_not_restartable_after_exhaustion() {
        let store = store_with_items(5);
        let mut paginator = CursorPaginator::new(&store, "tok", "l", 10);

        assert_eq!(paginator.next_page().await.unwrap().map(|p| p.len()), Some(5));
        assert!(paginator.next_page().await.unwrap().is_none());
        assert_eq!(store.list_items_calls(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_between_pages() {
        let store = store_with_items(25);
        let token = CancellationToken::new();
        let mut paginator =
            CursorPaginator::new(&store, "tok", "l", 10).with_cancellation(Some(&token));

        assert!(paginator.next_page().await.unwrap().is_some());
        token.cancel();

        assert!(matches!(
            paginator.next_page().await,
            Err(SyncError::Cancelled)
        ));
        assert_eq!(store.list_items_calls(), 1);
    }
}
