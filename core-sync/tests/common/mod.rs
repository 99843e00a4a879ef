//! Engine configuration shared by the pipeline integration tests.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{HttpClient, HttpRequest, HttpResponse};
use core_runtime::config::EngineConfig;
use std::sync::Arc;

/// The in-memory store never touches HTTP; the config still needs a client.
pub struct UnusedHttpClient;

#[async_trait]
impl HttpClient for UnusedHttpClient {
    async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse> {
        Err(BridgeError::NotAvailable("http".to_string()))
    }
}

pub fn config(max_batch_size: usize, concurrency: usize) -> EngineConfig {
    EngineConfig::builder()
        .site_id("site-1")
        .max_batch_size(max_batch_size)
        .default_concurrency(concurrency)
        .page_size(10)
        .http_client(Arc::new(UnusedHttpClient))
        .build()
        .unwrap()
}
