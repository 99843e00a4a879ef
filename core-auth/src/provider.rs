//! Token acquisition contract.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::AccessToken;

/// Supplies bearer tokens for a set of scopes.
///
/// `Ok(None)` means the provider is working but has no token for these
/// scopes (user signed out, consent missing). The engine treats that as an
/// authentication failure and stops the job.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self, scopes: &[String]) -> Result<Option<AccessToken>>;
}

/// Provider that always hands out the same token.
///
/// Used by command-line tools that receive a pre-acquired token, and by tests.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Option<AccessToken>,
}

impl StaticTokenProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            token: Some(AccessToken::new(secret)),
        }
    }

    /// Provider with no token; every request yields `Ok(None)`.
    pub fn empty() -> Self {
        Self { token: None }
    }

    /// Reads the token from an environment variable. A missing or blank
    /// variable produces an empty provider.
    pub fn from_env(var: &str) -> Self {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Self::new(value.trim()),
            _ => {
                warn!(var, "Access token environment variable is not set");
                Self::empty()
            }
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, scopes: &[String]) -> Result<Option<AccessToken>> {
        debug!(?scopes, available = self.token.is_some(), "Static token requested");
        Ok(self.token.clone())
    }
}
