//! # Sync Job State Machine
//!
//! Tracks one `sync_rows` invocation from authentication to its terminal
//! phase, rejecting transitions the pipeline must never take.
//!
//! ## Phases
//!
//! ```text
//! Authenticating → EnsureSchema ─┬─ (FullReplace) ClearExisting ─┬→ BuildOperations → Chunk → Dispatch → Completed
//!       │               │        └─ (Upsert)      FetchExisting ─┘
//!       ↓               ↓                  ↓
//!     Failed          Failed             Failed
//! ```
//!
//! `Cancelled` is reachable from every non-terminal phase. A failure inside
//! `Dispatch` is not a job failure: the job still completes and its
//! [`SyncResult`] carries the failed count.
//!
//! ## Usage
//!
//! ```rust
//! use core_sync::{SyncJob, SyncMode, SyncPhase, SyncResult};
//!
//! let mut job = SyncJob::new("KPIs", SyncMode::Upsert, 2, 45);
//! job.advance(SyncPhase::EnsureSchema).unwrap();
//! job.advance(SyncPhase::FetchExisting).unwrap();
//! job.advance(SyncPhase::BuildOperations).unwrap();
//! job.advance(SyncPhase::Chunk).unwrap();
//! job.advance(SyncPhase::Dispatch).unwrap();
//! job.complete(SyncResult::default()).unwrap();
//!
//! assert!(job.phase.is_terminal());
//! assert!(job.advance(SyncPhase::Dispatch).is_err());
//! ```

use chrono::{DateTime, Utc};
use core_async::sync::CancellationToken;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::model::ListRef;
use crate::{Result, SyncError};

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// # Errors
    ///
    /// Returns `SyncError::InvalidJobId` if `s` is not a UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidJobId(e.to_string()))
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Mode & Phase
// ============================================================================

/// Bulk strategy, chosen once per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Delete every existing item, then create one item per row.
    /// Remote-only data is lost.
    FullReplace,
    /// Update items matched by unique key, create the rest.
    Upsert,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::FullReplace => "full_replace",
            SyncMode::Upsert => "upsert",
        }
    }
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "full_replace" | "fullreplace" => Ok(SyncMode::FullReplace),
            "upsert" => Ok(SyncMode::Upsert),
            _ => Err(SyncError::InvalidSyncMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Authenticating,
    EnsureSchema,
    ClearExisting,
    FetchExisting,
    BuildOperations,
    Chunk,
    Dispatch,
    Completed,
    Failed,
    Cancelled,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncPhase::Completed | SyncPhase::Failed | SyncPhase::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Authenticating => "authenticating",
            SyncPhase::EnsureSchema => "ensure_schema",
            SyncPhase::ClearExisting => "clear_existing",
            SyncPhase::FetchExisting => "fetch_existing",
            SyncPhase::BuildOperations => "build_operations",
            SyncPhase::Chunk => "chunk",
            SyncPhase::Dispatch => "dispatch",
            SyncPhase::Completed => "completed",
            SyncPhase::Failed => "failed",
            SyncPhase::Cancelled => "cancelled",
        }
    }

    /// Whether the pipeline may move from `self` to `to`.
    pub fn can_transition_to(&self, to: SyncPhase) -> bool {
        use SyncPhase::*;

        match (self, to) {
            (from, _) if from.is_terminal() => false,
            (_, Cancelled) => true,

            (Authenticating, EnsureSchema) => true,
            (EnsureSchema, ClearExisting | FetchExisting | BuildOperations) => true,
            (ClearExisting | FetchExisting, BuildOperations) => true,
            (BuildOperations, Chunk) => true,
            (Chunk, Dispatch) => true,
            (Dispatch, Completed) => true,

            (Authenticating | EnsureSchema | ClearExisting | FetchExisting, Failed) => true,

            _ => false,
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Options & Results
// ============================================================================

/// Per-job options for `SyncPipeline::sync_rows`.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Overrides `EngineConfig::default_concurrency`
    pub concurrency: Option<usize>,
    /// Checked between pages and between batches
    pub cancellation: Option<CancellationToken>,
}

impl SyncOptions {
    pub fn upsert() -> Self {
        Self::with_mode(SyncMode::Upsert)
    }

    pub fn full_replace() -> Self {
        Self::with_mode(SyncMode::FullReplace)
    }

    fn with_mode(mode: SyncMode) -> Self {
        Self {
            mode,
            concurrency: None,
            cancellation: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Outcome of the FullReplace delete pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    pub deleted: usize,
    pub failed: usize,
}

/// Counts for one job. `submitted == succeeded + failed` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Operations handed to the dispatcher
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Batches dispatched, cancelled ones included
    pub batches: usize,
    /// Rejected rows and failed operations, one line each
    pub errors: Vec<String>,
    /// Present for FullReplace jobs that ran the delete pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared: Option<ClearReport>,
}

impl SyncResult {
    /// No failed operation and no rejected row.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.errors.is_empty()
    }
}

// ============================================================================
// Sync Job Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: SyncJobId,
    /// Display name of the target list
    pub list: String,
    /// Resolved once `EnsureSchema` succeeds
    pub target: Option<ListRef>,
    pub mode: SyncMode,
    pub concurrency: usize,
    /// Rows handed to the job
    pub row_count: usize,
    pub phase: SyncPhase,
    /// Phase the job was in when it failed
    pub failed_in: Option<SyncPhase>,
    pub result: Option<SyncResult>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    /// Creates a job in `Authenticating`.
    pub fn new(list: impl Into<String>, mode: SyncMode, concurrency: usize, row_count: usize) -> Self {
        Self {
            id: SyncJobId::new(),
            list: list.into(),
            target: None,
            mode,
            concurrency,
            row_count,
            phase: SyncPhase::Authenticating,
            failed_in: None,
            result: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Moves to a non-terminal phase.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidStateTransition` for any move the phase
    /// graph does not allow
    pub fn advance(&mut self, to: SyncPhase) -> Result<()> {
        self.transition(to)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        let from = self.phase;
        self.transition(SyncPhase::Failed)?;
        self.failed_in = Some(from);
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Cancels the job, keeping whatever was accomplished in `result`.
    pub fn cancel(&mut self, result: Option<SyncResult>) -> Result<()> {
        self.transition(SyncPhase::Cancelled)?;
        self.result = result;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, result: SyncResult) -> Result<()> {
        self.transition(SyncPhase::Completed)?;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Wall time from creation to the terminal phase.
    pub fn duration_ms(&self) -> Option<u64> {
        self.completed_at.map(|end| {
            let millis = (end - self.created_at).num_milliseconds();
            u64::try_from(millis).unwrap_or(0)
        })
    }

    fn transition(&mut self, to: SyncPhase) -> Result<()> {
        if !self.phase.can_transition_to(to) {
            return Err(SyncError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
                reason: format!("Job {} cannot move from {} to {}", self.id, self.phase, to),
            });
        }
        self.phase = to;
        Ok(())
    }
}

/// Terminal job record plus the counts it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub job: SyncJob,
    pub result: SyncResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert_job() -> SyncJob {
        SyncJob::new("KPIs", SyncMode::Upsert, 2, 10)
    }

    #[test]
    fn test_job_id_round_trip() {
        let id = SyncJobId::new();
        let parsed = SyncJobId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);

        assert!(matches!(
            SyncJobId::from_string("not-a-uuid"),
            Err(SyncError::InvalidJobId(_))
        ));
    }

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("upsert".parse::<SyncMode>().unwrap(), SyncMode::Upsert);
        assert_eq!("Full-Replace".parse::<SyncMode>().unwrap(), SyncMode::FullReplace);
        assert!(matches!(
            "merge".parse::<SyncMode>(),
            Err(SyncError::InvalidSyncMode(_))
        ));
    }

    #[test]
    fn test_full_replace_path() {
        let mut job = SyncJob::new("KPIs", SyncMode::FullReplace, 1, 3);
        for phase in [
            SyncPhase::EnsureSchema,
            SyncPhase::ClearExisting,
            SyncPhase::BuildOperations,
            SyncPhase::Chunk,
            SyncPhase::Dispatch,
        ] {
            job.advance(phase).unwrap();
        }
        job.complete(SyncResult::default()).unwrap();

        assert_eq!(job.phase, SyncPhase::Completed);
        assert!(job.result.is_some());
        assert!(job.duration_ms().is_some());
    }

    #[test]
    fn test_cannot_skip_schema() {
        let mut job = upsert_job();
        let err = job.advance(SyncPhase::Dispatch).unwrap_err();

        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));
        assert_eq!(job.phase, SyncPhase::Authenticating);
    }

    #[test]
    fn test_dispatch_cannot_fail() {
        let mut job = upsert_job();
        for phase in [
            SyncPhase::EnsureSchema,
            SyncPhase::BuildOperations,
            SyncPhase::Chunk,
            SyncPhase::Dispatch,
        ] {
            job.advance(phase).unwrap();
        }

        assert!(job.fail("boom").is_err());
        assert_eq!(job.phase, SyncPhase::Dispatch);
    }

    #[test]
    fn test_fail_records_phase() {
        let mut job = upsert_job();
        job.advance(SyncPhase::EnsureSchema).unwrap();
        job.fail("list lookup failed").unwrap();

        assert_eq!(job.phase, SyncPhase::Failed);
        assert_eq!(job.failed_in, Some(SyncPhase::EnsureSchema));
        assert_eq!(job.error_message.as_deref(), Some("list lookup failed"));
    }

    #[test]
    fn test_terminal_phases_are_final() {
        let mut job = upsert_job();
        job.cancel(None).unwrap();

        assert!(job.cancel(None).is_err());
        assert!(job.advance(SyncPhase::EnsureSchema).is_err());
        assert!(job.fail("late").is_err());
    }

    #[test]
    fn test_cancel_from_any_active_phase() {
        for phase in [SyncPhase::FetchExisting, SyncPhase::Chunk] {
            assert!(phase.can_transition_to(SyncPhase::Cancelled));
        }
        assert!(!SyncPhase::Completed.can_transition_to(SyncPhase::Cancelled));
    }

    #[test]
    fn test_options_builders() {
        let token = CancellationToken::new();
        let options = SyncOptions::full_replace()
            .with_concurrency(3)
            .with_cancellation(token.clone());

        assert_eq!(options.mode, SyncMode::FullReplace);
        assert_eq!(options.concurrency, Some(3));
        assert!(!options.is_cancelled());
        token.cancel();
        assert!(options.is_cancelled());
    }

    #[test]
    fn test_result_serializes_without_clear_report() {
        let result = SyncResult {
            submitted: 2,
            succeeded: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();

        assert!(json.get("cleared").is_none());
        assert!(result.is_clean());
    }
}
