//! `PageFetcher` trait and the reqwest-backed `HttpFetcher`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::IngestSettings;

// ---------------------------------------------------------------------------
// FetchError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("server answered {0}")]
    Status(u16),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

/// Remote fetch collaborator.  Shared across ingest tasks as
/// `Arc<dyn PageFetcher>`.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET `url` as text, bounded by the configured timeout.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;

    /// GET `url` as raw bytes.  Not timeout-bounded.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

pub struct HttpFetcher {
    client: reqwest::Client,
    page_timeout: Duration,
}

impl HttpFetcher {
    /// Build a fetcher that sends `settings.user_agent` with every request.
    pub fn from_settings(settings: &IngestSettings) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            page_timeout: Duration::from_secs(settings.fetch_timeout_secs),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.page_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// StaticFetcher  (test-only)
// ---------------------------------------------------------------------------

/// Serves canned pages and assets from memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pub pages: std::collections::HashMap<String, String>,
    pub assets: std::collections::HashMap<String, Vec<u8>>,
    /// Delay before answering, to let concurrent submissions overlap.
    pub latency: Option<Duration>,
}

#[cfg(test)]
impl StaticFetcher {
    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }

    pub fn asset(mut self, url: &str, bytes: &[u8]) -> Self {
        self.assets.insert(url.into(), bytes.to_vec());
        self
    }
}

#[cfg(test)]
#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        if let Some(delay) = self.latency {
            tokio::time::sleep(delay).await;
        }
        self.pages.get(url).cloned().ok_or(FetchError::Status(404))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.assets.get(url).cloned().ok_or(FetchError::Status(404))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
