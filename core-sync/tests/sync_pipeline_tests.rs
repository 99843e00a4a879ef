//! Integration tests for the sync pipeline
//!
//! These tests drive `SyncPipeline` end to end against an in-memory list
//! store:
//! - Schema reconciliation and its idempotence
//! - Upsert and FullReplace jobs
//! - Retry with backoff and batch failure isolation
//! - Bounded dispatch concurrency
//! - Fatal phases, row validation and cancellation

mod common;

use common::config;
use bridge_traits::lists::ItemWrite;
use core_async::sync::CancellationToken;
use core_auth::{AccessToken, StaticTokenProvider, TokenProvider};
use core_runtime::config::EngineConfig;
use core_runtime::events::{CollectingLogSink, EventBus, NullLogSink, SyncEvent};
use core_sync::testing::{MemoryListStore, RecordingSleeper, POISON_FIELD};
use core_sync::{
    ColumnDef, ListDefinition, ListRef, Row, SyncError, SyncOptions, SyncPhase, SyncPipeline,
    UniqueKey,
};
use mockall::mock;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

mock! {
    Auth {}

    #[async_trait::async_trait]
    impl TokenProvider for Auth {
        async fn get_token(&self, scopes: &[String]) -> core_auth::Result<Option<AccessToken>>;
    }
}

fn kpi_list() -> ListDefinition {
    ListDefinition::new("KPIs")
        .with_column(ColumnDef::text("Area").required())
        .with_column(ColumnDef::text("Period"))
        .with_column(ColumnDef::number("Year"))
        .with_column(ColumnDef::number("Value"))
        .with_unique_key(UniqueKey::new(["Area", "Period", "Year"]))
}

fn kpi_row(area: &str, period: &str, value: f64) -> Row {
    Row::new()
        .with("Area", area)
        .with("Period", period)
        .with("Year", 2024)
        .with("Value", value)
}

fn kpi_rows(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| kpi_row(&format!("A{}", i), "01", i as f64))
        .collect()
}

fn pipeline(
    store: &Arc<MemoryListStore>,
    config: EngineConfig,
    sleeper: &Arc<RecordingSleeper>,
) -> SyncPipeline {
    SyncPipeline::new(
        config,
        store.clone(),
        Arc::new(StaticTokenProvider::new("token")),
    )
    .with_sleeper(sleeper.clone())
}

fn drain(rx: &mut core_async::sync::broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Happy Paths
// ============================================================================

#[tokio::test]
async fn test_end_to_end_45_rows() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let log = CollectingLogSink::default();

    let outcome = pipeline(&store, config(20, 2), &sleeper)
        .sync_rows(&kpi_list(), kpi_rows(45), SyncOptions::upsert(), &log)
        .await
        .unwrap();

    assert_eq!(outcome.job.phase, SyncPhase::Completed);
    assert_eq!(outcome.result.batches, 3);
    assert_eq!(outcome.result.submitted, 45);
    assert_eq!(outcome.result.succeeded, 45);
    assert_eq!(outcome.result.failed, 0);
    assert!(outcome.result.is_clean());

    assert_eq!(store.batch_calls(), 3);
    assert!(store.max_in_flight() <= 2);
    assert_eq!(store.items().len(), 45);
    assert!(sleeper.delays().is_empty());

    assert!(log.contains("Ensuring schema for 'KPIs'"));
    assert!(log.contains("Dispatching 3 batch(es) with concurrency 2"));
    assert!(log.contains("Sync complete: 45 submitted, 45 succeeded, 0 failed"));
}

#[tokio::test]
async fn test_title_synthesized_from_unique_key() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let sleeper = Arc::new(RecordingSleeper::default());

    pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(
            &kpi_list(),
            vec![kpi_row("A", "01", 1.0), kpi_row("B", "02", 2.0).with_title("Custom")],
            SyncOptions::upsert(),
            &NullLogSink,
        )
        .await
        .unwrap();

    let items = store.items();
    assert_eq!(items[0].fields["Title"], "A|01|2024");
    assert_eq!(items[1].fields["Title"], "Custom");
}

#[tokio::test]
async fn test_upsert_updates_matching_items() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let existing = store.add_item(json!({
        "Area": "A", "Period": "01", "Year": 2024, "Value": 1
    }));
    let sleeper = Arc::new(RecordingSleeper::default());

    let outcome = pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(
            &kpi_list(),
            vec![kpi_row("A", "01", 9.0), kpi_row("B", "02", 3.0)],
            SyncOptions::upsert(),
            &NullLogSink,
        )
        .await
        .unwrap();

    assert_eq!(outcome.result.succeeded, 2);
    let writes = store.writes();
    assert!(matches!(&writes[0], ItemWrite::Update { item_id, .. } if *item_id == existing));
    assert!(matches!(&writes[1], ItemWrite::Create { .. }));

    let items = store.items();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].fields["Value"], 9.0);
}

#[tokio::test]
async fn test_ambiguous_key_falls_back_to_create() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    store.add_item(json!({ "Area": "A", "Period": "01", "Year": 2024 }));
    store.add_item(json!({ "Area": "A", "Period": "01", "Year": 2024 }));
    let sleeper = Arc::new(RecordingSleeper::default());
    let log = CollectingLogSink::default();

    pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(&kpi_list(), vec![kpi_row("A", "01", 5.0)], SyncOptions::upsert(), &log)
        .await
        .unwrap();

    assert!(matches!(&store.writes()[0], ItemWrite::Create { .. }));
    assert_eq!(store.items().len(), 3);
    assert!(log.contains("matches several existing items"));
}

#[tokio::test]
async fn test_full_replace_clears_then_creates() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    for i in 0..25 {
        store.add_item(json!({ "Area": format!("Old{}", i) }));
    }
    let sleeper = Arc::new(RecordingSleeper::default());
    let log = CollectingLogSink::default();

    let outcome = pipeline(&store, config(20, 2), &sleeper)
        .sync_rows(&kpi_list(), kpi_rows(3), SyncOptions::full_replace(), &log)
        .await
        .unwrap();

    assert!(log.contains("Batch delete-1: 20 succeeded"));
    assert!(log.contains("Batch delete-2: 5 succeeded"));
    assert!(log.contains("Batch batch-1: 3 succeeded"));
    let cleared = outcome.result.cleared.unwrap();
    assert_eq!(cleared.deleted, 25);
    assert_eq!(cleared.failed, 0);
    assert_eq!(outcome.result.submitted, 3);

    let writes = store.writes();
    assert_eq!(writes.len(), 28);
    assert!(writes[..25]
        .iter()
        .all(|w| matches!(w, ItemWrite::Delete { .. })));
    assert!(writes[25..]
        .iter()
        .all(|w| matches!(w, ItemWrite::Create { .. })));
    assert_eq!(store.items().len(), 3);
}

#[tokio::test]
async fn test_full_replace_skips_clear_on_fresh_list() {
    let store = Arc::new(MemoryListStore::default());
    let sleeper = Arc::new(RecordingSleeper::default());
    let log = CollectingLogSink::default();

    let outcome = pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(&kpi_list(), kpi_rows(2), SyncOptions::full_replace(), &log)
        .await
        .unwrap();

    assert_eq!(store.created_lists(), 1);
    assert_eq!(store.list_items_calls(), 0);
    assert!(outcome.result.cleared.is_none());
    assert_eq!(outcome.result.succeeded, 2);
    assert!(log.contains("was just created, nothing to clear"));
}

// ============================================================================
// Schema
// ============================================================================

#[tokio::test]
async fn test_ensure_schema_is_idempotent() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    store.add_column("Area");
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = pipeline(&store, config(20, 1), &sleeper);

    let first = pipeline.ensure_schema(&kpi_list(), &NullLogSink).await.unwrap();
    let second = pipeline.ensure_schema(&kpi_list(), &NullLogSink).await.unwrap();

    assert_eq!(first.created_columns, vec!["Period", "Year", "Value"]);
    assert!(second.created_columns.is_empty());
    assert_eq!(store.create_column_calls(), vec!["Period", "Year", "Value"]);
    assert_eq!(first.list_ref, second.list_ref);
}

#[tokio::test]
async fn test_ensure_schema_creates_list_once() {
    let store = Arc::new(MemoryListStore::default());
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = pipeline(&store, config(20, 1), &sleeper);

    let first = pipeline.ensure_schema(&kpi_list(), &NullLogSink).await.unwrap();
    let second = pipeline.ensure_schema(&kpi_list(), &NullLogSink).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(store.created_lists(), 1);
    assert!(store.create_column_calls().is_empty());
}

// ============================================================================
// Retry & Isolation
// ============================================================================

#[tokio::test]
async fn test_throttled_batch_is_retried_with_backoff() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    store.script_batch_statuses(&[429, 429]);
    let sleeper = Arc::new(RecordingSleeper::default());

    let outcome = pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(&kpi_list(), kpi_rows(3), SyncOptions::upsert(), &NullLogSink)
        .await
        .unwrap();

    assert_eq!(store.batch_calls(), 3);
    assert_eq!(outcome.result.succeeded, 3);
    assert_eq!(outcome.result.failed, 0);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(5000), Duration::from_millis(10000)]
    );
}

#[tokio::test]
async fn test_failing_batch_does_not_fail_the_job() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let definition = kpi_list().with_column(ColumnDef::text(POISON_FIELD));

    let rows: Vec<Row> = kpi_rows(100)
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            if (40..60).contains(&i) {
                row.with(POISON_FIELD, "yes")
            } else {
                row
            }
        })
        .collect();

    let outcome = pipeline(&store, config(20, 2), &sleeper)
        .sync_rows(&definition, rows, SyncOptions::upsert(), &NullLogSink)
        .await
        .unwrap();

    assert_eq!(outcome.job.phase, SyncPhase::Completed);
    assert_eq!(outcome.result.batches, 5);
    assert_eq!(outcome.result.submitted, 100);
    assert_eq!(outcome.result.succeeded, 80);
    assert_eq!(outcome.result.failed, 20);
    assert_eq!(outcome.result.errors.len(), 1);
    assert!(outcome.result.errors[0].contains("batch-3 failed after 5 attempt(s)"));
    assert_eq!(sleeper.delays().len(), 4);
    assert!(store.max_in_flight() <= 2);
}

// ============================================================================
// Fatal Phases
// ============================================================================

#[tokio::test]
async fn test_missing_token_aborts_before_writes() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let pipeline = SyncPipeline::new(
        config(20, 1),
        store.clone(),
        Arc::new(StaticTokenProvider::empty()),
    )
    .with_event_bus(bus);

    let err = pipeline
        .sync_rows(&kpi_list(), kpi_rows(5), SyncOptions::upsert(), &NullLogSink)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Auth(_)));
    assert!(err.is_fatal());
    assert_eq!(store.batch_calls(), 0);
    assert!(store.create_column_calls().is_empty());

    let events = drain(&mut rx);
    assert!(matches!(
        events.last(),
        Some(SyncEvent::Failed { phase, .. }) if phase == "authenticating"
    ));
}

#[tokio::test]
async fn test_token_requested_once_per_job() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let sleeper = Arc::new(RecordingSleeper::default());

    let mut auth = MockAuth::new();
    auth.expect_get_token()
        .withf(|scopes| scopes.len() == 1 && scopes[0] == "Sites.Manage.All")
        .times(1)
        .returning(|_| Ok(Some(AccessToken::new("secret"))));

    let outcome = SyncPipeline::new(config(20, 2), store.clone(), Arc::new(auth))
        .with_sleeper(sleeper)
        .sync_rows(&kpi_list(), kpi_rows(45), SyncOptions::upsert(), &NullLogSink)
        .await
        .unwrap();

    assert_eq!(outcome.result.succeeded, 45);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let expired = AccessToken::new("old").with_expiry(chrono::Utc::now() - chrono::Duration::minutes(5));

    let mut auth = MockAuth::new();
    auth.expect_get_token()
        .returning(move |_| Ok(Some(expired.clone())));

    let err = SyncPipeline::new(config(20, 1), store.clone(), Arc::new(auth))
        .sync_rows(&kpi_list(), kpi_rows(1), SyncOptions::upsert(), &NullLogSink)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Auth(message) if message.contains("expired")));
    assert_eq!(store.batch_calls(), 0);
}

#[tokio::test]
async fn test_schema_lookup_failure_is_fatal() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    store.fail_find();
    let sleeper = Arc::new(RecordingSleeper::default());
    let log = CollectingLogSink::default();

    let err = pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(&kpi_list(), kpi_rows(5), SyncOptions::upsert(), &log)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Schema { .. }));
    assert_eq!(store.batch_calls(), 0);
    assert!(log.contains("Sync failed during ensure_schema"));
}

#[tokio::test]
async fn test_snapshot_failure_is_fatal_for_upsert() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    for i in 0..15 {
        store.add_item(json!({ "Area": format!("A{}", i), "Period": "01", "Year": 2024 }));
    }
    store.fail_page(1);
    let sleeper = Arc::new(RecordingSleeper::default());
    let log = CollectingLogSink::default();

    let err = pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(&kpi_list(), kpi_rows(3), SyncOptions::upsert(), &log)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Pagination(_)));
    assert_eq!(store.list_items_calls(), 2);
    assert_eq!(store.batch_calls(), 0);
    assert!(log.contains("Sync failed during fetch_existing"));
}

#[tokio::test]
async fn test_upsert_requires_unique_key() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let definition = ListDefinition::new("KPIs").with_column(ColumnDef::text("Area"));

    let err = pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(&definition, Vec::new(), SyncOptions::upsert(), &NullLogSink)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidInput(_)));
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_invalid_rows_are_skipped_and_reported() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let log = CollectingLogSink::default();

    let rows = vec![
        kpi_row("A", "01", 1.0).with("Colour", "red"),
        kpi_row("B", "01", 1.0).with("Value", "abc"),
        Row::new().with("Area", "C").with("Year", 2024),
        kpi_row("D", "01", 4.0),
    ];

    let outcome = pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(&kpi_list(), rows, SyncOptions::upsert(), &log)
        .await
        .unwrap();

    assert_eq!(outcome.result.submitted, 1);
    assert_eq!(outcome.result.succeeded, 1);
    assert_eq!(outcome.result.errors.len(), 3);
    assert!(outcome.result.errors[0].starts_with("Row 0 rejected: unknown column 'Colour'"));
    assert!(outcome.result.errors[1].starts_with("Row 1 rejected: column 'Value' expects a number"));
    assert!(outcome.result.errors[2].starts_with("Row 2 rejected: missing unique key field(s): Period"));
    assert!(log.contains("Built 1 operation(s), 3 row(s) rejected"));
    assert_eq!(store.items().len(), 1);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancelled_before_start() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let token = CancellationToken::new();
    token.cancel();

    let outcome = pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(
            &kpi_list(),
            kpi_rows(10),
            SyncOptions::upsert().with_cancellation(token),
            &NullLogSink,
        )
        .await
        .unwrap();

    assert_eq!(outcome.job.phase, SyncPhase::Cancelled);
    assert_eq!(outcome.result.submitted, 0);
    assert_eq!(store.batch_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_between_batches() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let token = CancellationToken::new();

    let cancel_after_first = |message: &str| {
        if message.starts_with("Batch batch-1") {
            token.cancel();
        }
    };

    let outcome = pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(
            &kpi_list(),
            kpi_rows(60),
            SyncOptions::upsert().with_cancellation(token.clone()),
            &cancel_after_first,
        )
        .await
        .unwrap();

    assert_eq!(outcome.job.phase, SyncPhase::Cancelled);
    assert_eq!(store.batch_calls(), 1);
    assert_eq!(outcome.result.succeeded, 20);
    assert_eq!(outcome.result.failed, 40);
    assert_eq!(
        outcome.result.submitted,
        outcome.result.succeeded + outcome.result.failed
    );
    assert_eq!(outcome.job.result.as_ref(), Some(&outcome.result));
}

#[tokio::test]
async fn test_cancelled_during_delete_pass_keeps_partial_count() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    for i in 0..45 {
        store.add_item(json!({ "Area": format!("Old{}", i) }));
    }
    let sleeper = Arc::new(RecordingSleeper::default());
    let token = CancellationToken::new();

    let cancel_after_first_delete = |message: &str| {
        if message.starts_with("Batch delete-1") {
            token.cancel();
        }
    };

    let outcome = pipeline(&store, config(20, 1), &sleeper)
        .sync_rows(
            &kpi_list(),
            kpi_rows(5),
            SyncOptions::full_replace().with_cancellation(token.clone()),
            &cancel_after_first_delete,
        )
        .await
        .unwrap();

    assert_eq!(outcome.job.phase, SyncPhase::Cancelled);
    let cleared = outcome.result.cleared.as_ref().unwrap();
    assert_eq!(cleared.deleted, 20);
    assert_eq!(cleared.failed, 25);
    assert_eq!(outcome.result.submitted, 0);
    assert_eq!(store.batch_calls(), 1);
    assert_eq!(store.items().len(), 25);
    assert_eq!(outcome.job.result.as_ref(), Some(&outcome.result));
}

// ============================================================================
// Read Back & Events
// ============================================================================

#[tokio::test]
async fn test_fetch_all_strips_system_fields() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    store.add_item(json!({
        "@odata.etag": "\"1\"",
        "id": "1",
        "Title": "A|01|2024",
        "Area": "A",
        "Value": 3,
        "Modified": "2024-01-01T00:00:00Z",
        "_ComplianceTag": "",
        "LinkTitle": "A|01|2024"
    }));
    let sleeper = Arc::new(RecordingSleeper::default());
    let list_ref = ListRef {
        site_id: "site-1".to_string(),
        list_id: "list-1".to_string(),
        display_name: "KPIs".to_string(),
    };

    let rows = pipeline(&store, config(20, 1), &sleeper)
        .fetch_all(&list_ref)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.item_id(), Some("item-1"));
    assert_eq!(row.title(), Some("A|01|2024"));
    assert_eq!(row.len(), 2);
    assert_eq!(row.get("Area").and_then(|v| v.as_text()), Some("A"));
    assert_eq!(row.get("Value").and_then(|v| v.as_number()), Some(3.0));
    assert!(row.get("id").is_none());
}

#[tokio::test]
async fn test_events_follow_the_job() {
    let store = Arc::new(MemoryListStore::with_list("list-1", "KPIs"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();

    let outcome = pipeline(&store, config(20, 2), &sleeper)
        .with_event_bus(bus)
        .sync_rows(&kpi_list(), kpi_rows(45), SyncOptions::upsert(), &NullLogSink)
        .await
        .unwrap();

    let events = drain(&mut rx);
    let job_id = outcome.job.id.to_string();

    assert!(events.iter().all(|e| e.job_id() == job_id));
    assert!(matches!(events.first(), Some(SyncEvent::Started { rows: 45, .. })));
    assert!(matches!(
        events.last(),
        Some(SyncEvent::Completed { succeeded: 45, failed: 0, .. })
    ));

    let batches = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::BatchCompleted { .. }))
        .count();
    assert_eq!(batches, 3);

    let phases: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::PhaseChanged { phase, .. } => Some(phase.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec!["ensure_schema", "fetch_existing", "build_operations", "chunk", "dispatch"]
    );
}
