//! Bounded-concurrency batch dispatch.
//!
//! `N` workers share one queue of batches. Each worker claims the next
//! unclaimed batch, submits it, records the outcome and claims again until
//! the queue is empty. Workers are cooperative futures polled together on the
//! current task, so "concurrency N" means at most N composite calls in
//! flight, not N threads.
//!
//! A failed batch never stops its siblings. The only early exit is
//! cancellation, observed before each claim; batches still queued at that
//! point are reported as failed with reason "cancelled".

use core_async::sync::{CancellationToken, Mutex};
use futures::future::join_all;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::chunker::Batch;
use crate::uploader::{BatchOutcome, BatchSubmitter};

/// Aggregate of every batch outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// Per-batch outcomes in completion order
    pub outcomes: Vec<BatchOutcome>,
    pub cancelled: bool,
}

impl DispatchReport {
    fn record(&mut self, outcome: BatchOutcome) {
        self.submitted += outcome.submitted;
        self.succeeded += outcome.succeeded;
        self.failed += outcome.failed;
        self.errors.extend(outcome.errors.iter().cloned());
        self.outcomes.push(outcome);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    concurrency: usize,
}

impl Dispatcher {
    /// `concurrency` is clamped to at least 1.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Drains `batches` through `submitter`.
    ///
    /// `on_outcome` is called once per batch as soon as it finishes.
    pub async fn dispatch(
        &self,
        batches: Vec<Batch>,
        submitter: &dyn BatchSubmitter,
        cancellation: Option<&CancellationToken>,
        on_outcome: &(dyn Fn(&BatchOutcome) + Send + Sync),
    ) -> DispatchReport {
        let total = batches.len();
        let workers = self.concurrency.min(total);
        info!(batches = total, workers, "Dispatching batches");

        let queue = Mutex::new(batches.into_iter().collect::<VecDeque<_>>());
        let report = Mutex::new(DispatchReport::default());
        let queue = &queue;
        let report = &report;

        let is_cancelled = || cancellation.is_some_and(|token| token.is_cancelled());

        let worker_futures = (0..workers).map(|worker| async move {
            loop {
                if is_cancelled() {
                    debug!(worker, "Cancellation observed, worker stopping");
                    break;
                }

                let next = queue.lock().await.pop_front();
                let Some(batch) = next else {
                    break;
                };

                let outcome = submitter.submit(&batch).await;
                on_outcome(&outcome);
                report.lock().await.record(outcome);
            }
        });

        join_all(worker_futures).await;

        let mut report = report.lock().await.clone();
        let leftover: Vec<Batch> = queue.lock().await.drain(..).collect();
        if !leftover.is_empty() {
            report.cancelled = true;
            for batch in &leftover {
                let outcome = BatchOutcome::not_attempted(batch, "cancelled");
                on_outcome(&outcome);
                report.record(outcome);
            }
        }
        if is_cancelled() {
            report.cancelled = true;
        }

        report
    }
}
