use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Crawl counters shared by all workers
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    /// In-memory metrics store
    metrics: Arc<Mutex<Metrics>>,
}

/// Metrics data structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Metrics {
    /// Start time of the crawl
    pub start_time: DateTime<Utc>,

    /// End time of the crawl, once finished
    pub finished_at: Option<DateTime<Utc>>,

    /// Fetch attempts (successful or not)
    pub fetch_attempts: usize,

    /// Fetches that returned content
    pub fetch_successes: usize,

    /// Fetches that failed (network error, timeout, non-2xx)
    pub fetch_failures: usize,

    /// URLs skipped because robots.txt disallowed them
    pub robots_denied: usize,

    /// Pages without any visible text
    pub empty_pages: usize,

    /// Pages that passed the relevance gate
    pub pages_relevant: usize,

    /// Pages that did not pass the relevance gate
    pub pages_irrelevant: usize,

    /// Candidate links scored against the topic
    pub links_scored: usize,

    /// Links added to the frontier
    pub links_enqueued: usize,

    /// Tasks that panicked while being processed
    pub task_panics: usize,

    /// Bytes downloaded
    pub bytes_downloaded: usize,

    /// Total fetch time in milliseconds
    pub fetch_time_ms: u64,

    /// HTTP status code counts
    pub status_codes: HashMap<u16, usize>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let metrics = Metrics {
            start_time: Utc::now(),
            ..Default::default()
        };

        Self {
            metrics: Arc::new(Mutex::new(metrics)),
        }
    }

    /// Record a fetch attempt
    pub async fn record_fetch(&self, success: bool, duration_ms: u64, status_code: Option<u16>, bytes: usize) {
        let mut metrics = self.metrics.lock().await;

        metrics.fetch_attempts += 1;
        if success {
            metrics.fetch_successes += 1;
        } else {
            metrics.fetch_failures += 1;
        }

        metrics.bytes_downloaded += bytes;
        metrics.fetch_time_ms += duration_ms;

        if let Some(code) = status_code {
            *metrics.status_codes.entry(code).or_default() += 1;
        }
    }

    /// Record the outcome of the page relevance gate
    pub async fn record_page(&self, relevant: bool) {
        let mut metrics = self.metrics.lock().await;
        if relevant {
            metrics.pages_relevant += 1;
        } else {
            metrics.pages_irrelevant += 1;
        }
    }

    /// Record link expansion for one page
    pub async fn record_links(&self, scored: usize, enqueued: usize) {
        let mut metrics = self.metrics.lock().await;
        metrics.links_scored += scored;
        metrics.links_enqueued += enqueued;
    }

    pub async fn record_empty_page(&self) {
        self.metrics.lock().await.empty_pages += 1;
    }

    pub async fn record_robots_denied(&self) {
        self.metrics.lock().await.robots_denied += 1;
    }

    pub async fn record_panic(&self) {
        self.metrics.lock().await.task_panics += 1;
    }

    /// Stamp the end time
    pub async fn finish(&self) {
        self.metrics.lock().await.finished_at = Some(Utc::now());
    }

    /// Start timing a request
    pub fn start_timer(&self) -> RequestTimer {
        RequestTimer {
            start: Instant::now(),
        }
    }

    /// Get all metrics
    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Wall-clock duration of the crawl in seconds, if finished
    pub fn duration_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }
}

/// Request timer for measuring request durations
pub struct RequestTimer {
    /// Start time of the request
    start: Instant,
}

impl RequestTimer {
    /// End timing and get the duration in milliseconds
    pub fn end(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
