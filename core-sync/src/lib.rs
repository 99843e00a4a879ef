//! # List Sync Engine
//!
//! Writes tabular rows into a remote list store and keeps its schema in
//! step with a declared [`ListDefinition`].
//!
//! ## Overview
//!
//! A job moves through a fixed set of phases (see [`job`]):
//! authenticate, reconcile the schema, clear or snapshot existing items,
//! build create/update/delete operations, chunk them into composite
//! batches and dispatch the batches with bounded concurrency.
//!
//! ## Components
//!
//! - **Retry Policy** (`retry`): which statuses are transient and how long to wait
//! - **Cursor Paginator** (`paginator`): sequential walk over a paged listing
//! - **Schema Reconciler** (`schema`): ensures the list and its columns exist
//! - **Batch Chunker** (`chunker`): splits operations into composite batches
//! - **Batch Uploader** (`uploader`): submits one batch under the retry policy
//! - **Dispatcher** (`dispatcher`): runs batches through N workers
//! - **Upsert Resolver** (`upsert`): create-versus-update by unique key
//! - **Sync Pipeline** (`pipeline`): the orchestrator and public entry point

pub mod chunker;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod model;
pub mod paginator;
pub mod pipeline;
pub mod retry;
pub mod schema;
pub mod uploader;
pub mod upsert;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use chunker::{chunk, chunk_as, Batch, Operation, OperationKind};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{Result, SyncError};
pub use job::{
    ClearReport, SyncJob, SyncJobId, SyncMode, SyncOptions, SyncOutcome, SyncPhase, SyncResult,
};
pub use model::{ColumnDef, ColumnKind, FieldValue, ListDefinition, ListRef, Row, UniqueKey};
pub use paginator::CursorPaginator;
pub use pipeline::SyncPipeline;
pub use retry::RetryPolicy;
pub use schema::{EnsuredList, SchemaReconciler};
pub use uploader::{BatchOutcome, BatchSubmitter, BatchUploader};
pub use upsert::{ExistingIndex, Resolution, UpsertResolver};
