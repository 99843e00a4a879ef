//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for native hosts (macOS, Windows,
//! Linux and headless servers).
//!
//! - `HttpClient` using `reqwest` with rustls
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use std::sync::Arc;
//!
//! let http_client = Arc::new(ReqwestHttpClient::new()?);
//! let connector = GraphListsConnector::new(http_client, "https://graph.microsoft.com/v1.0", site_id);
//! ```

mod http;

pub use http::ReqwestHttpClient;
