//! # Progress Reporting
//!
//! Two channels carry sync progress out of the engine:
//!
//! - **[`LogSink`]**: the caller-supplied `onLog(message)` callback. It receives
//!   one human-readable line at every phase transition and for every batch
//!   outcome. This is the only coupling between the engine and a UI.
//! - **[`EventBus`]**: an optional `broadcast` channel of typed [`SyncEvent`]s
//!   for hosts that want structured progress (dashboards, tests).
//!
//! ```text
//! ┌──────────────┐  on_log("Dispatching 3 batches")   ┌──────────┐
//! │ SyncPipeline ├───────────────────────────────────>│ LogSink  │
//! │              │                                    └──────────┘
//! │              │  emit(SyncEvent::BatchCompleted)   ┌──────────┐    subscribe
//! │              ├───────────────────────────────────>│ EventBus ├──────────────>
//! └──────────────┘                                    └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CollectingLogSink, LogSink};
//!
//! let sink = CollectingLogSink::default();
//! sink.on_log("Ensuring schema for 'KPIs'");
//! assert_eq!(sink.messages().len(), 1);
//!
//! // Any `Fn(&str)` is a sink too.
//! let print = |message: &str| println!("{message}");
//! print.on_log("hello");
//! ```
//!
//! Subscribers of the bus should treat `RecvError::Lagged` as non-fatal and
//! `RecvError::Closed` as shutdown.

use core_async::sync::broadcast::{self, error::SendError};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Default buffer size for the event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Caller-supplied progress callback.
pub trait LogSink: Send + Sync {
    fn on_log(&self, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_log(&self, message: &str) {
        self(message)
    }
}

/// Sink that discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn on_log(&self, _message: &str) {}
}

/// Sink that keeps every message in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingLogSink {
    messages: Mutex<Vec<String>>,
}

impl CollectingLogSink {
    /// Snapshot of the messages received so far.
    pub fn messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// True if any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl LogSink for CollectingLogSink {
    fn on_log(&self, message: &str) {
        match self.messages.lock() {
            Ok(mut guard) => guard.push(message.to_string()),
            Err(poisoned) => poisoned.into_inner().push(message.to_string()),
        }
    }
}

/// Structured sync progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Job created and about to authenticate.
    Started {
        job_id: String,
        list: String,
        mode: String,
        rows: u64,
    },
    /// The job's state machine moved to a new phase.
    PhaseChanged { job_id: String, phase: String },
    /// One batch reached a terminal outcome.
    BatchCompleted {
        job_id: String,
        batch_id: String,
        succeeded: u64,
        failed: u64,
        attempts: u32,
    },
    /// Job reached `Completed` (possibly with failed operations).
    Completed {
        job_id: String,
        submitted: u64,
        succeeded: u64,
        failed: u64,
        duration_ms: u64,
    },
    /// Job stopped on a phase-fatal error.
    Failed {
        job_id: String,
        phase: String,
        message: String,
    },
    /// Job stopped on an external cancellation signal.
    Cancelled { job_id: String },
}

impl SyncEvent {
    /// Job id carried by every variant.
    pub fn job_id(&self) -> &str {
        match self {
            SyncEvent::Started { job_id, .. }
            | SyncEvent::PhaseChanged { job_id, .. }
            | SyncEvent::BatchCompleted { job_id, .. }
            | SyncEvent::Completed { job_id, .. }
            | SyncEvent::Failed { job_id, .. }
            | SyncEvent::Cancelled { job_id } => job_id,
        }
    }
}

/// Broadcast bus for [`SyncEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// `capacity` is the number of events buffered per subscriber before it
    /// starts receiving `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it, or an error when
    /// nobody is listening. Callers usually ignore that error with `.ok()`.
    pub fn emit(&self, event: SyncEvent) -> Result<usize, SendError<SyncEvent>> {
        self.sender.send(event)
    }

    /// Creates a new independent subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}
