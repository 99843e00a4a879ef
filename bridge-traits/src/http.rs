//! HTTP Client Abstraction
//!
//! Transport contract used by list store connectors. Implementations perform a
//! single attempt per call: retry decisions belong to the sync engine, which
//! needs to see every 429/5xx to apply its own backoff.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Verbs the list connectors issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Upper-case verb as it appears on the wire and in composite requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Outgoing request, built fluently.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;
        self.body = Some(Bytes::from(json));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Buffered response; the status is left for the caller to judge.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| BridgeError::Decode(format!("JSON deserialization failed: {}", e)))
    }

    /// True for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Retry-After` header in whole seconds.
    ///
    /// Header names are matched case-insensitively. HTTP-date values are not
    /// interpreted and yield `None`.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
            .and_then(|(_, value)| value.trim().parse().ok())
    }

    /// Convert a non-2xx response into a [`BridgeError::Http`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }

        let retry_after_secs = self.retry_after_secs();
        let message = String::from_utf8_lossy(&self.body).to_string();
        Err(BridgeError::Http {
            status: self.status,
            retry_after_secs,
            message,
        })
    }
}

/// Single-attempt transport used by the list store connectors.
///
/// Connection pooling, TLS and per-request timeouts are the implementation's
/// business. Retrying is not: a 429 or 503 must reach the caller untouched so
/// the batch uploader can honour `Retry-After`.
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
///
/// async fn list_count(client: &dyn HttpClient, token: &str) -> bridge_traits::error::Result<usize> {
///     let request = HttpRequest::new(HttpMethod::Get, "https://graph.microsoft.com/v1.0/sites/root/lists")
///         .bearer_token(token);
///     let page: serde_json::Value = client.execute(request).await?.error_for_status()?.json()?;
///     Ok(page["value"].as_array().map_or(0, Vec::len))
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends `request` once.
    ///
    /// # Errors
    ///
    /// Transport failures only (DNS, TLS, connect, timeout). Non-2xx statuses are NOT errors at this layer; they are returned as a
    /// regular [`HttpResponse`].
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::new(HttpMethod::Get, "https://example.com")
            .header("Accept", "application/json")
            .bearer_token("secret")
            .timeout(Duration::from_secs(30));

        assert_eq!(request.url, "https://example.com");
        assert_eq!(
            request.headers.get("Accept"),
            Some(&"application/json".to_string())
        );
        assert_eq!(
            request.headers.get("Authorization"),
            Some(&"Bearer secret".to_string())
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_http_request_json_body() {
        let request = HttpRequest::new(HttpMethod::Post, "https://example.com")
            .json(&serde_json::json!({ "displayName": "KPIs" }))
            .unwrap();

        assert_eq!(
            request.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
        assert_eq!(
            request.body.as_deref(),
            Some(br#"{"displayName":"KPIs"}"#.as_slice())
        );
    }

    #[test]
    fn test_success_range() {
        let response = |status| HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        };

        assert!(response(200).is_success());
        assert!(response(204).is_success());
        assert!(!response(302).is_success());
        assert!(!response(429).is_success());
    }

    #[test]
    fn test_retry_after_header_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), " 7 ".to_string());
        let response = HttpResponse {
            status: 429,
            headers,
            body: Bytes::new(),
        };

        assert_eq!(response.retry_after_secs(), Some(7));
    }

    #[test]
    fn test_error_for_status_carries_hint() {
        let mut headers = HashMap::new();
        headers.insert("Retry-After".to_string(), "3".to_string());
        let response = HttpResponse {
            status: 503,
            headers,
            body: Bytes::from("busy"),
        };

        let err = response.error_for_status().unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.retry_after_secs(), Some(3));
        assert_eq!(err.to_string(), "HTTP 503: busy");
    }
}
