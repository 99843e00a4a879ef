//! Injectable sleeping for retry backoff, plus the host log sink contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;

/// Where retry delays are spent.
///
/// The engine never sleeps directly: retry delays go through a `Sleeper` so
/// tests can observe the exact backoff schedule without waiting for it.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::time::Sleeper;
/// use std::time::Duration;
///
/// async fn back_off(sleeper: &dyn Sleeper, attempt: u32) {
///     sleeper.sleep(Duration::from_secs(5) * attempt).await;
/// }
/// ```
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the runtime timer.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSleeper;

#[async_trait]
impl Sleeper for RuntimeSleeper {
    async fn sleep(&self, duration: Duration) {
        core_async::time::sleep(duration).await;
    }
}

/// Severity mirrored from `tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// One engine event as seen by a host sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Emitting module, e.g. `core_sync::uploader`
    pub target: String,
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Host-side receiver for engine log events.
///
/// Fields whose names look like credentials are redacted by the runtime
/// before they reach a sink.
#[async_trait]
pub trait LoggerSink: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    /// Entries below this level are not forwarded.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_builder() {
        let entry = LogEntry::new(LogLevel::Info, "core_sync", "Batch submitted")
            .with_field("batch_id", "3");

        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.target, "core_sync");
        assert_eq!(entry.message, "Batch submitted");
        assert_eq!(entry.fields.get("batch_id"), Some(&"3".to_string()));
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Trace < LogLevel::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_sleeper_advances_clock() {
        let start = tokio::time::Instant::now();
        RuntimeSleeper.sleep(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
