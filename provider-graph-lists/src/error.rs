//! Error types for the Graph lists provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Graph lists provider errors
#[derive(Error, Debug)]
pub enum GraphListsError {
    /// API request returned a non-success status
    #[error("Graph API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    Parse(String),

    /// Continuation link points outside the configured API
    #[error("Invalid continuation cursor: {0}")]
    InvalidCursor(String),

    /// Bridge error
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for Graph lists operations
pub type Result<T> = std::result::Result<T, GraphListsError>;

impl From<GraphListsError> for BridgeError {
    fn from(error: GraphListsError) -> Self {
        match error {
            GraphListsError::Api {
                status,
                message,
                retry_after_secs,
            } => BridgeError::Http {
                status,
                retry_after_secs,
                message,
            },
            GraphListsError::Parse(msg) => BridgeError::Decode(msg),
            GraphListsError::InvalidCursor(cursor) => {
                BridgeError::OperationFailed(format!("Invalid continuation cursor: {}", cursor))
            }
            GraphListsError::Bridge(e) => e,
        }
    }
}
