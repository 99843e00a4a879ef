use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The remote answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        retry_after_secs: Option<u64>,
        message: String,
    },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// HTTP status carried by this error, if the remote produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            BridgeError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-supplied `Retry-After` hint in seconds.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            BridgeError::Http {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
