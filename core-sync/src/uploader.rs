//! Submission of one composite batch under the retry policy.

use async_trait::async_trait;
use bridge_traits::lists::{BatchEntry, BatchEntryResult, ListStore};
use bridge_traits::time::Sleeper;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::chunker::{Batch, Operation};
use crate::error::SyncError;
use crate::retry::RetryPolicy;

/// Terminal result of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Composite calls made for this batch
    pub attempts: u32,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Outcome for a batch that was never submitted.
    pub fn not_attempted(batch: &Batch, reason: &str) -> Self {
        Self {
            batch_id: batch.id.clone(),
            submitted: batch.len(),
            succeeded: 0,
            failed: batch.len(),
            attempts: 0,
            errors: vec![format!("{}: {}", batch.id, reason)],
        }
    }
}

/// Something that turns a batch into a terminal outcome.
///
/// Implementations must not return errors: every failure is folded into the
/// outcome so the dispatcher keeps draining its queue.
#[async_trait]
pub trait BatchSubmitter: Send + Sync {
    async fn submit(&self, batch: &Batch) -> BatchOutcome;
}

/// Submits batches to a [`ListStore`] composite endpoint.
///
/// - A retryable top-level failure (429/500/503) resubmits the whole batch.
/// - Each sub-response is inspected on its own. 2xx counts as succeeded,
///   a retryable status is resubmitted with the other retryable entries,
///   anything else counts as failed.
/// - All resubmissions share one attempt budget. The pause honors the
///   largest `Retry-After` among the entries being retried.
///
/// Creates have no server-side idempotency key, so a lost success response
/// followed by a retry can duplicate an item.
pub struct BatchUploader<'a> {
    store: &'a dyn ListStore,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
    token: &'a str,
    list_id: &'a str,
}

impl<'a> BatchUploader<'a> {
    pub fn new(
        store: &'a dyn ListStore,
        sleeper: &'a dyn Sleeper,
        policy: RetryPolicy,
        token: &'a str,
        list_id: &'a str,
    ) -> Self {
        Self {
            store,
            sleeper,
            policy,
            token,
            list_id,
        }
    }

    #[instrument(skip(self, batch), fields(batch_id = %batch.id, ops = batch.len()))]
    pub async fn upload(&self, batch: &Batch) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            batch_id: batch.id.clone(),
            submitted: batch.len(),
            succeeded: 0,
            failed: 0,
            attempts: 0,
            errors: Vec::new(),
        };

        if batch.is_empty() {
            return outcome;
        }

        // Sub-request ids are 1-based positions within the batch
        let mut pending: Vec<(String, &Operation)> = batch
            .ops
            .iter()
            .enumerate()
            .map(|(i, op)| ((i + 1).to_string(), op))
            .collect();

        loop {
            outcome.attempts += 1;
            let attempt = outcome.attempts;

            let entries: Vec<BatchEntry> = pending
                .iter()
                .map(|(id, op)| BatchEntry {
                    id: id.clone(),
                    write: op.to_write(),
                })
                .collect();

            let results = match self
                .store
                .submit_batch(self.token, self.list_id, &entries)
                .await
            {
                Ok(results) => results,
                Err(e) => match e.status() {
                    Some(status) if self.policy.should_retry(status, attempt) => {
                        let delay = self.policy.next_delay(attempt, e.retry_after_secs());
                        warn!(
                            attempt,
                            status,
                            delay_ms = delay.as_millis() as u64,
                            "Batch throttled or failed, retrying whole batch"
                        );
                        self.sleeper.sleep(delay).await;
                        continue;
                    }
                    _ => {
                        let error = SyncError::Batch {
                            batch_id: batch.id.clone(),
                            attempts: attempt,
                            message: e.to_string(),
                        };
                        warn!("{}", error);
                        outcome.failed += pending.len();
                        outcome.errors.push(error.to_string());
                        return outcome;
                    }
                },
            };

            let mut retry = Vec::new();
            let mut hint: Option<u64> = None;

            for (id, op) in pending {
                match results.iter().find(|r| r.id == id) {
                    Some(result) if result.is_success() => outcome.succeeded += 1,
                    Some(result) if self.policy.should_retry(result.status, attempt) => {
                        hint = hint.max(result.retry_after_secs);
                        retry.push((id, op));
                    }
                    Some(result) => {
                        outcome.failed += 1;
                        outcome
                            .errors
                            .push(entry_error(&batch.id, op, result, attempt));
                    }
                    None => {
                        outcome.failed += 1;
                        outcome.errors.push(format!(
                            "{}: {} operation {} got no sub-response",
                            batch.id,
                            op.kind().as_str(),
                            id
                        ));
                    }
                }
            }

            if retry.is_empty() {
                debug!(
                    succeeded = outcome.succeeded,
                    failed = outcome.failed,
                    attempts = outcome.attempts,
                    "Batch finished"
                );
                return outcome;
            }

            let delay = self.policy.next_delay(attempt, hint);
            warn!(
                attempt,
                entries = retry.len(),
                delay_ms = delay.as_millis() as u64,
                "Resubmitting throttled operations"
            );
            self.sleeper.sleep(delay).await;
            pending = retry;
        }
    }
}

#[async_trait]
impl<'a> BatchSubmitter for BatchUploader<'a> {
    async fn submit(&self, batch: &Batch) -> BatchOutcome {
        self.upload(batch).await
    }
}

fn entry_error(batch_id: &str, op: &Operation, result: &BatchEntryResult, attempt: u32) -> String {
    let target = op.item_id().unwrap_or("new item");
    let message = result.message.as_deref().unwrap_or("no details");
    format!(
        "{}: {} of {} failed with status {} after {} attempt(s): {}",
        batch_id,
        op.kind().as_str(),
        target,
        result.status,
        attempt,
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk;
    use crate::testing::{http_error, BatchReply, MemoryListStore, RecordingSleeper};
    use bridge_traits::lists::FieldMap;
    use serde_json::json;
    use std::time::Duration;

    fn creates(n: usize) -> Batch {
        let ops = (0..n)
            .map(|i| {
                let mut fields = FieldMap::new();
                fields.insert("Seq".to_string(), json!(i));
                Operation::create(fields)
            })
            .collect();
        chunk(ops, 20).remove(0)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let store = MemoryListStore::with_list("l", "KPIs");
        let sleeper = RecordingSleeper::default();
        let uploader = BatchUploader::new(&store, &sleeper, RetryPolicy::default(), "tok", "l");

        let outcome = uploader.upload(&creates(5)).await;

        assert_eq!(outcome.succeeded, 5);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.is_success());
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_throttled_twice_then_success() {
        let store = MemoryListStore::with_list("l", "KPIs");
        store.push_batch_reply(BatchReply::Fail(http_error(429, None)));
        store.push_batch_reply(BatchReply::Fail(http_error(429, None)));
        let sleeper = RecordingSleeper::default();
        let uploader = BatchUploader::new(&store, &sleeper, RetryPolicy::default(), "tok", "l");

        let outcome = uploader.upload(&creates(3)).await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.succeeded, 3);
        assert_eq!(store.submitted().len(), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(5000), Duration::from_millis(10000)]
        );
        assert_eq!(store.item_count(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_whole_batch_immediately() {
        let store = MemoryListStore::with_list("l", "KPIs");
        store.push_batch_reply(BatchReply::Fail(http_error(400, None)));
        let sleeper = RecordingSleeper::default();
        let uploader = BatchUploader::new(&store, &sleeper, RetryPolicy::default(), "tok", "l");

        let outcome = uploader.upload(&creates(4)).await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.failed, 4);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("batch-1 failed after 1 attempt(s)"));
    }

    #[tokio::test]
    async fn test_exhausted_attempts() {
        let store = MemoryListStore::with_list("l", "KPIs");
        for _ in 0..5 {
            store.push_batch_reply(BatchReply::Fail(http_error(500, None)));
        }
        let sleeper = RecordingSleeper::default();
        let uploader = BatchUploader::new(&store, &sleeper, RetryPolicy::default(), "tok", "l");

        let outcome = uploader.upload(&creates(2)).await;

        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.failed, 2);
        assert_eq!(sleeper.delays().len(), 4);
        assert_eq!(sleeper.delays()[3], Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_sub_response_throttling_resubmits_only_those_entries() {
        let store = MemoryListStore::with_list("l", "KPIs");
        store.push_batch_reply(BatchReply::Statuses(vec![(1, 429, Some(2)), (2, 503, Some(3))]));
        let sleeper = RecordingSleeper::default();
        let uploader = BatchUploader::new(&store, &sleeper, RetryPolicy::default(), "tok", "l");

        let outcome = uploader.upload(&creates(4)).await;

        assert_eq!(outcome.succeeded, 4);
        assert_eq!(outcome.attempts, 2);
        let submitted = store.submitted();
        assert_eq!(submitted[1].len(), 2);
        assert_eq!(submitted[1][0].id, "2");
        assert_eq!(submitted[1][1].id, "3");
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(3)]);
    }

    #[tokio::test]
    async fn test_sub_response_client_error_counts_as_failed() {
        let store = MemoryListStore::with_list("l", "KPIs");
        store.push_batch_reply(BatchReply::Statuses(vec![(0, 400, None)]));
        let sleeper = RecordingSleeper::default();
        let uploader = BatchUploader::new(&store, &sleeper, RetryPolicy::default(), "tok", "l");

        let outcome = uploader.upload(&creates(3)).await;

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.submitted, outcome.succeeded + outcome.failed);
        assert!(outcome.errors[0].contains("status 400"));
    }
}
