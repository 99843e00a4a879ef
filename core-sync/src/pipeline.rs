//! # Sync Pipeline
//!
//! Entry point of the engine. One [`SyncPipeline`] owns an explicit
//! [`EngineConfig`] plus its collaborators, and runs jobs through the phases
//! described in [`crate::job`].
//!
//! ## Failure policy
//!
//! - Authentication, schema and existing-item snapshot failures stop the job
//!   before any row write and are returned as `Err`.
//! - Batch failures never stop the job. It completes and the returned
//!   [`SyncResult`] carries the failed count.
//! - Cancellation ends the job `Cancelled`; the outcome is still returned.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let pipeline = SyncPipeline::new(config, Arc::new(connector), Arc::new(auth));
//! let outcome = pipeline
//!     .sync_rows(&definition, rows, SyncOptions::upsert(), &|m: &str| println!("{m}"))
//!     .await?;
//! println!("{} of {} written", outcome.result.succeeded, outcome.result.submitted);
//! ```

use bridge_traits::lists::ListStore;
use bridge_traits::time::{RuntimeSleeper, Sleeper};
use core_async::sync::CancellationToken;
use core_auth::{AuthError, TokenProvider};
use core_runtime::config::EngineConfig;
use core_runtime::events::{EventBus, LogSink, SyncEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::chunker::{chunk, chunk_as, Batch, Operation};
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::{Result, SyncError};
use crate::job::{ClearReport, SyncJob, SyncMode, SyncOptions, SyncOutcome, SyncPhase, SyncResult};
use crate::model::{ListDefinition, ListRef, Row};
use crate::paginator::CursorPaginator;
use crate::retry::RetryPolicy;
use crate::schema::{EnsuredList, SchemaReconciler};
use crate::uploader::{BatchOutcome, BatchUploader};
use crate::upsert::{payload, UpsertResolver};

/// Housekeeping fields the store adds to every item.
const SYSTEM_FIELDS: &[&str] = &[
    "id",
    "ContentType",
    "Modified",
    "Created",
    "AuthorLookupId",
    "EditorLookupId",
    "AppAuthorLookupId",
    "AppEditorLookupId",
    "_UIVersionString",
    "Attachments",
    "Edit",
    "LinkTitle",
    "LinkTitleNoMenu",
    "ItemChildCount",
    "FolderChildCount",
    "DocIcon",
];

fn is_system_field(name: &str) -> bool {
    name.starts_with('@') || name.starts_with("_Compliance") || SYSTEM_FIELDS.contains(&name)
}

/// How a job run ended when no fatal error occurred.
enum RunEnd {
    Finished(SyncResult),
    Cancelled(SyncResult),
}

pub struct SyncPipeline {
    config: EngineConfig,
    store: Arc<dyn ListStore>,
    auth: Arc<dyn TokenProvider>,
    sleeper: Arc<dyn Sleeper>,
    events: Option<EventBus>,
}

impl SyncPipeline {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ListStore>,
        auth: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            config,
            store,
            auth,
            sleeper: Arc::new(RuntimeSleeper),
            events: None,
        }
    }

    /// Replaces the sleeper used for retry delays.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Makes sure the list and its declared columns exist.
    #[instrument(skip(self, definition, log), fields(list = %definition.display_name))]
    pub async fn ensure_schema(
        &self,
        definition: &ListDefinition,
        log: &dyn LogSink,
    ) -> Result<EnsuredList> {
        definition.validate()?;
        let token = self.acquire_token().await?;
        self.reconciler().ensure(&token, definition, log).await
    }

    /// Reads every item of a list back as rows.
    ///
    /// Store housekeeping fields are stripped; the item id is kept on
    /// [`Row::item_id`].
    #[instrument(skip(self), fields(list_id = %list_ref.list_id))]
    pub async fn fetch_all(&self, list_ref: &ListRef) -> Result<Vec<Row>> {
        let token = self.acquire_token().await?;
        let items = CursorPaginator::new(
            self.store.as_ref(),
            &token,
            &list_ref.list_id,
            self.config.page_size,
        )
        .fetch_all()
        .await?;

        Ok(items
            .iter()
            .map(|item| Row::from_remote(&item.id, &item.fields, &is_system_field))
            .collect())
    }

    /// Writes `rows` into the list described by `definition`.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidInput` for an invalid definition, or Upsert
    ///   without a unique key
    /// - `SyncError::Auth` if no usable token is available
    /// - `SyncError::Schema` if the list or its columns cannot be read
    /// - `SyncError::Pagination` if the existing-item snapshot fails
    #[instrument(skip_all, fields(list = %definition.display_name, mode = %options.mode, rows = rows.len()))]
    pub async fn sync_rows(
        &self,
        definition: &ListDefinition,
        rows: Vec<Row>,
        options: SyncOptions,
        log: &dyn LogSink,
    ) -> Result<SyncOutcome> {
        definition.validate()?;
        if options.mode == SyncMode::Upsert && definition.unique_key.is_none() {
            return Err(SyncError::InvalidInput(format!(
                "Upsert into '{}' requires a unique key",
                definition.display_name
            )));
        }

        let concurrency = options
            .concurrency
            .unwrap_or(self.config.default_concurrency)
            .max(1);
        let mut job = SyncJob::new(
            definition.display_name.clone(),
            options.mode,
            concurrency,
            rows.len(),
        );
        let job_id = job.id.to_string();

        info!(job_id = %job_id, concurrency, "Sync job started");
        log.on_log(&format!(
            "Starting {} sync of {} row(s) into '{}'",
            options.mode,
            rows.len(),
            definition.display_name
        ));
        self.emit(SyncEvent::Started {
            job_id: job_id.clone(),
            list: definition.display_name.clone(),
            mode: options.mode.to_string(),
            rows: rows.len() as u64,
        });

        let end = match self.run(&mut job, definition, rows, &options, log).await {
            Ok(end) => end,
            Err(SyncError::Cancelled) => RunEnd::Cancelled(SyncResult::default()),
            Err(err) => {
                let phase = job.phase;
                if let Err(transition) = job.fail(err.to_string()) {
                    warn!(error = %transition, "Could not record job failure");
                }
                error!(job_id = %job_id, phase = %phase, error = %err, "Sync job failed");
                log.on_log(&format!("Sync failed during {}: {}", phase, err));
                self.emit(SyncEvent::Failed {
                    job_id,
                    phase: phase.to_string(),
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        match end {
            RunEnd::Finished(result) => {
                job.complete(result.clone())?;
                info!(
                    job_id = %job_id,
                    submitted = result.submitted,
                    succeeded = result.succeeded,
                    failed = result.failed,
                    "Sync job completed"
                );
                log.on_log(&format!(
                    "Sync complete: {} submitted, {} succeeded, {} failed",
                    result.submitted, result.succeeded, result.failed
                ));
                self.emit(SyncEvent::Completed {
                    job_id,
                    submitted: result.submitted as u64,
                    succeeded: result.succeeded as u64,
                    failed: result.failed as u64,
                    duration_ms: job.duration_ms().unwrap_or(0),
                });
                Ok(SyncOutcome { job, result })
            }
            RunEnd::Cancelled(result) => {
                job.cancel(Some(result.clone()))?;
                warn!(job_id = %job_id, "Sync job cancelled");
                log.on_log(&format!(
                    "Sync cancelled: {} of {} operation(s) succeeded",
                    result.succeeded, result.submitted
                ));
                self.emit(SyncEvent::Cancelled { job_id });
                Ok(SyncOutcome { job, result })
            }
        }
    }

    async fn run(
        &self,
        job: &mut SyncJob,
        definition: &ListDefinition,
        rows: Vec<Row>,
        options: &SyncOptions,
        log: &dyn LogSink,
    ) -> Result<RunEnd> {
        let job_id = job.id.to_string();
        let cancellation = options.cancellation.as_ref();

        log.on_log("Authenticating");
        let token = self.acquire_token().await?;
        check_cancelled(options)?;

        self.enter(
            job,
            SyncPhase::EnsureSchema,
            log,
            format!("Ensuring schema for '{}'", definition.display_name),
        )?;
        let ensured = self.reconciler().ensure(&token, definition, log).await?;
        job.target = Some(ensured.list_ref.clone());
        let list_id = ensured.list_ref.list_id.as_str();
        check_cancelled(options)?;

        let mut errors = Vec::new();
        let mut cleared = None;
        let mut existing = HashMap::new();

        match options.mode {
            SyncMode::FullReplace if ensured.created => {
                log.on_log(&format!(
                    "List '{}' was just created, nothing to clear",
                    definition.display_name
                ));
            }
            SyncMode::FullReplace => {
                self.enter(
                    job,
                    SyncPhase::ClearExisting,
                    log,
                    "Clearing existing items".to_string(),
                )?;
                let report = self
                    .clear_existing(&token, list_id, job.concurrency, cancellation, &job_id, log)
                    .await?;
                errors.extend(report.errors);
                cleared = Some(ClearReport {
                    deleted: report.succeeded,
                    failed: report.failed,
                });
                if report.cancelled {
                    return Ok(RunEnd::Cancelled(SyncResult {
                        errors,
                        cleared,
                        ..SyncResult::default()
                    }));
                }
            }
            SyncMode::Upsert => {
                self.enter(
                    job,
                    SyncPhase::FetchExisting,
                    log,
                    "Fetching existing items".to_string(),
                )?;
                let items = CursorPaginator::new(
                    self.store.as_ref(),
                    &token,
                    list_id,
                    self.config.page_size,
                )
                .with_cancellation(cancellation)
                .fetch_all()
                .await?;

                if let Some(key) = &definition.unique_key {
                    let index = UpsertResolver::new(key).index_existing(&items);
                    for ambiguous in index.ambiguous() {
                        log.on_log(&format!(
                            "Warning: key '{}' matches several existing items; matching rows will be created",
                            ambiguous
                        ));
                    }
                    existing = index.as_map().clone();
                }
                log.on_log(&format!("Found {} existing item(s)", items.len()));
            }
        }
        check_cancelled(options)?;

        self.enter(
            job,
            SyncPhase::BuildOperations,
            log,
            format!("Building operations for {} row(s)", rows.len()),
        )?;
        let operations = build_operations(definition, rows, options.mode, &existing, &mut errors, log);
        check_cancelled(options)?;

        self.enter(
            job,
            SyncPhase::Chunk,
            log,
            format!("Chunking {} operation(s)", operations.len()),
        )?;
        let batches = chunk(operations, self.config.max_batch_size);
        let batch_count = batches.len();

        self.enter(
            job,
            SyncPhase::Dispatch,
            log,
            format!(
                "Dispatching {} batch(es) with concurrency {}",
                batch_count, job.concurrency
            ),
        )?;
        let report = self
            .dispatch(&token, list_id, batches, job.concurrency, cancellation, &job_id, log)
            .await;

        errors.extend(report.errors);
        let result = SyncResult {
            submitted: report.submitted,
            succeeded: report.succeeded,
            failed: report.failed,
            batches: batch_count,
            errors,
            cleared,
        };

        Ok(if report.cancelled {
            RunEnd::Cancelled(result)
        } else {
            RunEnd::Finished(result)
        })
    }

    /// Deletes every item of the list through the batch path.
    ///
    /// A cancelled delete pass still returns its report, with `cancelled` set.
    async fn clear_existing(
        &self,
        token: &str,
        list_id: &str,
        concurrency: usize,
        cancellation: Option<&CancellationToken>,
        job_id: &str,
        log: &dyn LogSink,
    ) -> Result<DispatchReport> {
        let items = CursorPaginator::new(self.store.as_ref(), token, list_id, self.config.page_size)
            .with_cancellation(cancellation)
            .fetch_all()
            .await?;

        log.on_log(&format!("Deleting {} existing item(s)", items.len()));
        let deletes: Vec<Operation> = items
            .into_iter()
            .map(|item| Operation::delete(item.id))
            .collect();
        let batches = chunk_as(deletes, self.config.max_batch_size, "delete");

        Ok(self
            .dispatch(token, list_id, batches, concurrency, cancellation, job_id, log)
            .await)
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        token: &str,
        list_id: &str,
        batches: Vec<Batch>,
        concurrency: usize,
        cancellation: Option<&CancellationToken>,
        job_id: &str,
        log: &dyn LogSink,
    ) -> DispatchReport {
        let uploader = BatchUploader::new(
            self.store.as_ref(),
            self.sleeper.as_ref(),
            RetryPolicy::from_config(&self.config),
            token,
            list_id,
        );

        let on_outcome = |outcome: &BatchOutcome| {
            log.on_log(&describe_outcome(outcome));
            self.emit(SyncEvent::BatchCompleted {
                job_id: job_id.to_string(),
                batch_id: outcome.batch_id.clone(),
                succeeded: outcome.succeeded as u64,
                failed: outcome.failed as u64,
                attempts: outcome.attempts,
            });
        };

        Dispatcher::new(concurrency)
            .dispatch(batches, &uploader, cancellation, &on_outcome)
            .await
    }

    async fn acquire_token(&self) -> Result<String> {
        let scopes = &self.config.scopes;
        match self.auth.get_token(scopes).await? {
            Some(token) if token.is_expired() => Err(SyncError::Auth(
                "access token has expired".to_string(),
            )),
            Some(token) => Ok(token.secret().to_string()),
            None => Err(AuthError::TokenUnavailable {
                scopes: scopes.clone(),
            }
            .into()),
        }
    }

    fn reconciler(&self) -> SchemaReconciler<'_> {
        SchemaReconciler::from_config(self.store.as_ref(), self.sleeper.as_ref(), &self.config)
    }

    fn enter(
        &self,
        job: &mut SyncJob,
        phase: SyncPhase,
        log: &dyn LogSink,
        message: String,
    ) -> Result<()> {
        job.advance(phase)?;
        info!(job_id = %job.id, phase = %phase, "Entering phase");
        log.on_log(&message);
        self.emit(SyncEvent::PhaseChanged {
            job_id: job.id.to_string(),
            phase: phase.to_string(),
        });
        Ok(())
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            // No subscribers is not an error
            events.emit(event).ok();
        }
    }
}

fn check_cancelled(options: &SyncOptions) -> Result<()> {
    if options.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}

/// Validates rows and turns the survivors into operations.
///
/// Rejected rows are reported in `errors` and never submitted.
fn build_operations(
    definition: &ListDefinition,
    rows: Vec<Row>,
    mode: SyncMode,
    existing: &HashMap<String, String>,
    errors: &mut Vec<String>,
    log: &dyn LogSink,
) -> Vec<Operation> {
    let rejected_before = errors.len();
    let mut positions = Vec::with_capacity(rows.len());
    let mut valid = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        match definition.validate_row(row) {
            Ok(row) => {
                positions.push(index);
                valid.push(row);
            }
            Err(reason) => reject(index, reason, errors, log),
        }
    }

    let operations = match (mode, &definition.unique_key) {
        (SyncMode::Upsert, Some(key)) => {
            let resolution = UpsertResolver::new(key).resolve(existing, &valid);
            for (position, reason) in resolution.rejected {
                reject(positions[position], reason, errors, log);
            }
            resolution.operations
        }
        _ => valid
            .iter()
            .map(|row| {
                let key_value = definition
                    .unique_key
                    .as_ref()
                    .and_then(|key| key.value_for_row(row).ok());
                Operation::create(payload(row, key_value.as_deref()))
            })
            .collect(),
    };

    log.on_log(&format!(
        "Built {} operation(s), {} row(s) rejected",
        operations.len(),
        errors.len() - rejected_before
    ));
    operations
}

fn reject(row_index: usize, reason: String, errors: &mut Vec<String>, log: &dyn LogSink) {
    let error = SyncError::Validation { row_index, reason };
    warn!("{}", error);
    log.on_log(&error.to_string());
    errors.push(error.to_string());
}

fn describe_outcome(outcome: &BatchOutcome) -> String {
    if outcome.is_success() {
        format!(
            "Batch {}: {} succeeded ({} attempt(s))",
            outcome.batch_id, outcome.succeeded, outcome.attempts
        )
    } else {
        format!(
            "Batch {}: {} succeeded, {} failed ({} attempt(s))",
            outcome.batch_id, outcome.succeeded, outcome.failed, outcome.attempts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_fields() {
        assert!(is_system_field("@odata.etag"));
        assert!(is_system_field("_ComplianceTag"));
        assert!(is_system_field("LinkTitle"));
        assert!(!is_system_field("Title"));
        assert!(!is_system_field("Area"));
    }

    #[test]
    fn test_describe_outcome() {
        let outcome = BatchOutcome {
            batch_id: "batch-2".to_string(),
            submitted: 20,
            succeeded: 18,
            failed: 2,
            attempts: 3,
            errors: Vec::new(),
        };
        assert_eq!(
            describe_outcome(&outcome),
            "Batch batch-2: 18 succeeded, 2 failed (3 attempt(s))"
        );
    }
}
