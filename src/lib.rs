//! Workspace facade crate.
//!
//! Re-exports the list synchronization engine and its default collaborators so
//! host applications can depend on `listsync-workspace` and enable features
//! instead of wiring each crate individually.
//!
//! - `desktop-shims` (default): engine, Graph list connector, and the reqwest
//!   HTTP client injected by [`EngineConfig`](core_runtime::config::EngineConfig).
//! - `graph`: engine and Graph list connector without the desktop HTTP client.

#[cfg(any(feature = "desktop-shims", feature = "graph"))]
pub use core_runtime::{config::EngineConfig, events::LogSink, logging};

#[cfg(any(feature = "desktop-shims", feature = "graph"))]
pub use core_sync::{
    ListDefinition, ListRef, Row, SyncMode, SyncOptions, SyncOutcome, SyncPipeline, SyncResult,
};

#[cfg(any(feature = "desktop-shims", feature = "graph"))]
pub use provider_graph_lists::GraphListsConnector;
