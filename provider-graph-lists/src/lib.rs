//! # Graph Lists Provider
//!
//! Implements the `ListStore` trait for Graph-style list REST APIs.
//!
//! ## Overview
//!
//! This module provides:
//! - List lookup by display name and generic list creation
//! - Column discovery and text/number column creation
//! - Item paging through `@odata.nextLink` continuation URLs
//! - Single-item create/update/delete
//! - Composite writes through the `$batch` endpoint (at most 20 sub-requests)
//!
//! The connector performs one HTTP attempt per call. Throttling and server
//! errors surface as `BridgeError::Http` with the parsed `Retry-After` hint so
//! the engine's retry policy can act on them.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::GraphListsConnector;
pub use error::{GraphListsError, Result};
