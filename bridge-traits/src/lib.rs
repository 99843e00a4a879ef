//! # Host Bridge Traits
//!
//! Contracts between the sync engine and the outside world.
//!
//! ## Overview
//!
//! The engine never talks to the network, the clock or a logger directly. Each
//! capability it needs is a trait here, implemented once per host:
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single-attempt async HTTP transport
//! - [`ListStore`](lists::ListStore) - Remote list store REST contract
//!
//! ### Utilities
//! - [`Sleeper`](time::Sleeper) - Suspension source for retry delays
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Non-2xx HTTP
//! answers become [`BridgeError::Http`](error::BridgeError::Http) with the status
//! code and any `Retry-After` hint preserved, so callers can tell transient
//! failures from terminal ones.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared by every worker of the batch dispatcher.

pub mod error;
pub mod http;
pub mod lists;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use lists::{
    BatchEntry, BatchEntryResult, ColumnKind, ColumnSpec, FieldMap, ItemPage, ItemWrite,
    ListStore, RemoteColumn, RemoteItem, RemoteList, MAX_COMPOSITE_REQUESTS,
};
pub use time::{LogEntry, LogLevel, LoggerSink, RuntimeSleeper, Sleeper};
