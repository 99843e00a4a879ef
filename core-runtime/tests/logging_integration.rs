//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for MemorySink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

// The global subscriber can only be installed once per process, so every
// assertion that depends on it lives in this single test.
#[test]
fn test_init_logging_once_and_mirror_to_sink() {
    let sink = Arc::new(MemorySink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config.clone()).expect("first init succeeds");
    assert!(init_logging(config).is_err(), "second init must fail");

    tracing::debug!(target: "core_sync", authorization = "Bearer abc", "token acquired");
    tracing::debug!(target: "hyper", "connection pooled");

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1, "dependency noise is filtered at warn");
    assert_eq!(entries[0].message, "token acquired");
    assert_eq!(
        entries[0].fields.get("authorization"),
        Some(&"[REDACTED]".to_string())
    );
}
