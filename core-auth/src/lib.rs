//! # Authentication Module
//!
//! Contract between the sync engine and whatever acquires access tokens.
//!
//! ## Overview
//!
//! The engine never runs an OAuth flow itself. It asks a [`TokenProvider`]
//! for a bearer token covering the configured scopes once per sync job and
//! attaches it to every request of that job. Interactive login, token caches
//! and refresh all live on the host side of this trait.
//!
//! ```rust
//! use core_auth::{StaticTokenProvider, TokenProvider};
//!
//! let provider = StaticTokenProvider::new("eyJ0eXAi...");
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! let token = rt
//!     .block_on(provider.get_token(&["Sites.Manage.All".to_string()]))
//!     .unwrap()
//!     .expect("static provider always has a token");
//! assert_eq!(token.secret(), "eyJ0eXAi...");
//! ```

pub mod error;
pub mod provider;
pub mod types;

pub use error::{AuthError, Result};
pub use provider::{StaticTokenProvider, TokenProvider};
pub use types::AccessToken;
