use bridge_traits::error::BridgeError;
use thiserror::Error;

use crate::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Schema error for list '{list}': {message}")]
    Schema { list: String, message: String },

    #[error("Transient HTTP failure (status {status})")]
    TransientHttp {
        status: u16,
        retry_after_secs: Option<u64>,
    },

    #[error("Batch {batch_id} failed after {attempts} attempt(s): {message}")]
    Batch {
        batch_id: String,
        attempts: u32,
        message: String,
    },

    #[error("Pagination failed: {0}")]
    Pagination(String),

    #[error("Row {row_index} rejected: {reason}")]
    Validation { row_index: usize, reason: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid sync mode: {0}")]
    InvalidSyncMode(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Errors that stop a job before or instead of dispatching writes.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(_)
                | SyncError::Schema { .. }
                | SyncError::Pagination(_)
                | SyncError::InvalidInput(_)
                | SyncError::Config(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        match error.status() {
            Some(status) if RetryPolicy::is_retryable_status(status) => SyncError::TransientHttp {
                status,
                retry_after_secs: error.retry_after_secs(),
            },
            _ => SyncError::Provider(error.to_string()),
        }
    }
}

impl From<core_auth::AuthError> for SyncError {
    fn from(error: core_auth::AuthError) -> Self {
        SyncError::Auth(error.to_string())
    }
}

impl From<core_runtime::Error> for SyncError {
    fn from(error: core_runtime::Error) -> Self {
        SyncError::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
