//! Backoff decisions for transient HTTP failures.
//!
//! [`RetryPolicy`] is a pure value: it answers "retry?" and "how long to wait?"
//! and never sleeps itself. Callers own the suspension (see
//! [`Sleeper`](bridge_traits::time::Sleeper)).

use core_runtime::config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Statuses treated as transient. Everything else is terminal.
pub const RETRYABLE_STATUSES: [u16; 3] = [429, 500, 503];

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub const DEFAULT_HINT: Duration = Duration::from_secs(5);

/// Linear backoff scaled by the server's `Retry-After` hint.
///
/// `delay = (hint ?? default_hint) * attempt`
///
/// ```
/// use core_sync::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert!(policy.should_retry(429, 1));
/// assert!(!policy.should_retry(404, 1));
/// assert_eq!(policy.next_delay(2, None), Duration::from_secs(10));
/// assert_eq!(policy.next_delay(3, Some(2)), Duration::from_secs(6));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    default_hint: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, default_hint: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            default_hint,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.retry_max_attempts,
            Duration::from_secs(config.retry_default_hint_secs),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn default_hint(&self) -> Duration {
        self.default_hint
    }

    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_STATUSES.contains(&status)
    }

    /// Whether attempt number `attempt` (1-based), which just failed with
    /// `status`, may be followed by another one.
    pub fn should_retry(&self, status: u16, attempt: u32) -> bool {
        Self::is_retryable_status(status) && attempt < self.max_attempts
    }

    /// Pause before the attempt following `attempt`.
    pub fn next_delay(&self, attempt: u32, hint_secs: Option<u64>) -> Duration {
        let base = hint_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_hint);

        base.checked_mul(attempt.max(1)).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_HINT)
    }
}
