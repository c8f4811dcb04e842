use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{RegistryHealthPort, TransportUnavailable};

/// Default per-request timeout of the registry probe, in milliseconds.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

#[derive(Clone)]
/// HTTP client probing the schema registry.
pub struct RegistryHttpClient {
    http: reqwest::Client,
    timeout_ms: u64,
}

impl fmt::Debug for RegistryHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHttpClient")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl Default for RegistryHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryHttpClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[async_trait]
impl RegistryHealthPort for RegistryHttpClient {
    async fn probe(&self, url: &str) -> Result<StatusCode, TransportUnavailable> {
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await?;

        let status = response.status();
        // Drain the body so the connection can go back to the pool.
        let _ = response.bytes().await;

        tracing::debug!(url, status = status.as_u16(), "schema registry probed");
        Ok(status)
    }
}
