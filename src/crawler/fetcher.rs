use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::cli::config::CrawlerSettings;

/// Errors that can occur while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status code {0}")]
    Status(u16),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Fetcher is shut down")]
    Closed,
}

impl FetchError {
    /// HTTP status code behind the error, if the server answered
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Status(code) => Some(*code),
            FetchError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: String,

    /// HTTP status code
    pub status_code: u16,

    /// Response body
    pub body: String,
}

/// Network access for the crawl engine
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a single page; any non-2xx status is an error
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed fetcher sharing one connection pool between all workers
pub struct HttpFetcher {
    /// HTTP client
    client: Client,

    /// Caps the number of requests in flight
    permits: Arc<Semaphore>,

    /// Per-request timeout
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher from the crawler settings
    pub fn new(settings: &CrawlerSettings) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let concurrency = settings.concurrency.max(1);

        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(timeout)
            .pool_max_idle_per_host(concurrency)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(concurrency)),
            timeout,
        })
    }

    /// The shared HTTP client, for collaborators that should reuse the pool
    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Closed)?;

        debug!("Fetching {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Http(e)
            }
        })?;

        Ok(FetchedPage {
            url: url.to_string(),
            status_code: status.as_u16(),
            body,
        })
    }
}
