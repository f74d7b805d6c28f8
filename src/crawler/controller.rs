use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::analysis::extractor::{Extraction, Extractor, Link, PageInspection};
use crate::analysis::patterns::{PatternError, PatternSet};
use crate::analysis::relevance::{LexicalScorer, RelevanceGate, ScorerError, SimilarityScorer};
use crate::cli::config::CrawlerConfig;
use crate::crawler::fetcher::{FetchError, HttpFetcher, PageFetcher};
use crate::crawler::frontier::{is_valid_structure, parse_crawlable, Enqueue, Frontier};
use crate::crawler::robots::{HttpRobotsChecker, RobotsChecker};
use crate::crawler::task::{CrawlResult, CrawlTask};
use crate::utils::MetricsCollector;

/// Receives the crawl progress as a fraction in `[0, 1]`
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Errors that prevent a crawl from starting
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Seed URL must be an absolute http(s) URL without fragment: {0}")]
    InvalidSeed(String),

    #[error("Target topic must not be empty")]
    EmptyTopic,

    #[error("{0} must be at least 1")]
    InvalidLimit(&'static str),

    #[error("Relevance threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("Relevance scorer unavailable: {0}")]
    ScorerUnavailable(#[source] ScorerError),

    #[error("Invalid dark pattern table: {0}")]
    Patterns(#[from] PatternError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] FetchError),
}

/// Input of one crawl
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    /// URL the crawl starts from
    pub seed_url: String,

    /// Topic pages and anchor texts are scored against
    pub topic: String,

    /// Maximum number of URLs fetched (or attempted)
    pub max_pages: usize,

    /// Number of workers
    pub concurrency: usize,
}

/// Stops a running crawl from outside the engine
#[derive(Clone)]
pub struct CancelHandle {
    frontier: Arc<Frontier>,
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Close the frontier; workers finish their current page and exit
    pub async fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            info!("Cancellation requested");
        }
        self.frontier.close().await;
    }
}

/// Emits non-decreasing progress values
struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last: Mutex<f32>,
    max_pages: usize,
}

impl ProgressReporter {
    async fn report(&self, visited: usize) {
        let fraction = (visited as f32 / self.max_pages as f32).min(1.0);

        // Held while calling back so concurrent reports cannot overtake each other
        let mut last = self.last.lock().await;
        *last = last.max(fraction);

        if let Some(callback) = &self.callback {
            callback(*last);
        }
    }
}

/// State shared by all workers of one crawl
struct CrawlContext {
    frontier: Arc<Frontier>,
    fetcher: Arc<dyn PageFetcher>,
    robots: Option<Arc<dyn RobotsChecker>>,
    gate: RelevanceGate,
    extractor: Extractor,
    metrics: MetricsCollector,
    progress: ProgressReporter,
}

impl CrawlContext {
    /// Fetch and analyse one page. Returns its findings, if any.
    async fn process(&self, task: &CrawlTask) -> Option<Extraction> {
        if let Some(robots) = &self.robots {
            if !robots.is_allowed(&task.url).await {
                info!(url = %task.url, "Disallowed by robots.txt, skipping");
                self.metrics.record_robots_denied().await;
                return None;
            }
        }

        let timer = self.metrics.start_timer();
        let page = match self.fetcher.fetch(&task.url).await {
            Ok(page) => {
                debug!(url = %page.url, status = page.status_code, bytes = page.body.len(), "Fetched");
                self.metrics
                    .record_fetch(true, timer.end(), Some(page.status_code), page.body.len())
                    .await;
                page
            }
            Err(e) => {
                warn!(url = %task.url, error = %e, "Fetch failed");
                self.metrics
                    .record_fetch(false, timer.end(), e.status_code(), 0)
                    .await;
                return None;
            }
        };

        // The DOM is not Send, so parsing happens in one synchronous step
        match self.extractor.inspect(&page.body, &task.url, &self.gate) {
            PageInspection::Empty => {
                debug!(url = %task.url, "Page has no visible text, skipping");
                self.metrics.record_empty_page().await;
                None
            }
            PageInspection::Parsed {
                score,
                relevant,
                extraction,
                links,
            } => {
                debug!(
                    url = %task.url,
                    score,
                    relevant,
                    titles = extraction.titles.len(),
                    dark_patterns = extraction.dark_patterns.len(),
                    "Page scored"
                );
                self.metrics.record_page(relevant).await;
                self.expand(&task.url, links).await;
                Some(extraction)
            }
        }
    }

    /// Score candidate links by anchor text and enqueue the ones that pass
    async fn expand(&self, page_url: &str, links: Vec<Link>) {
        if self.frontier.is_saturated().await {
            debug!(url = %page_url, "Page cap reached, not following links");
            return;
        }

        let mut scored = 0;
        let mut enqueued = 0;

        for link in links {
            if link.anchor_text.is_empty() || link.url == page_url {
                continue;
            }
            if !is_valid_structure(&link.url) || self.frontier.contains(&link.url).await {
                continue;
            }

            scored += 1;
            let score = self.gate.score(&link.anchor_text);
            if !self.gate.accepts(score) {
                continue;
            }

            match self.frontier.try_enqueue(&link.url).await {
                Enqueue::Added(url) => {
                    debug!(url = %url, score, from = %page_url, "Enqueued link");
                    enqueued += 1;
                }
                Enqueue::Closed => break,
                Enqueue::Duplicate | Enqueue::Invalid => {}
            }
        }

        self.metrics.record_links(scored, enqueued).await;
    }
}

/// Worker loop: runs until the frontier is exhausted or closed
async fn worker(id: usize, context: Arc<CrawlContext>) -> Extraction {
    let mut found = Extraction::default();
    debug!(worker = id, "Worker started");

    while let Some(task) = context.frontier.dequeue().await {
        debug!(worker = id, url = %task.url, "Processing task");

        match AssertUnwindSafe(context.process(&task)).catch_unwind().await {
            Ok(Some(extraction)) => {
                found.titles.extend(extraction.titles);
                found.dark_patterns.extend(extraction.dark_patterns);
            }
            Ok(None) => {}
            Err(_) => {
                error!(worker = id, url = %task.url, "Task panicked, continuing with the next one");
                context.metrics.record_panic().await;
            }
        }

        let visited = context.frontier.mark_visited(&task.url).await;
        context.progress.report(visited).await;
        context.frontier.task_done().await;
    }

    debug!(worker = id, "Worker stopped");
    found
}

/// Focused crawl engine: one instance runs one crawl
pub struct CrawlerController {
    request: CrawlRequest,
    frontier: Arc<Frontier>,
    fetcher: Arc<dyn PageFetcher>,
    robots: Option<Arc<dyn RobotsChecker>>,
    gate: RelevanceGate,
    extractor: Extractor,
    progress: Option<ProgressCallback>,
    cancelled: Arc<AtomicBool>,
}

impl CrawlerController {
    /// Create a controller with the HTTP fetcher, the lexical scorer, and
    /// robots.txt enforcement when the configuration asks for it
    pub fn new(config: &CrawlerConfig, request: CrawlRequest) -> Result<Self, CrawlError> {
        let settings = &config.crawler;

        let patterns = PatternSet::new(&config.patterns.keywords, &config.patterns.css_classes)?;
        let extractor = Extractor::new(patterns)?;

        let mut http_settings = settings.clone();
        http_settings.concurrency = request.concurrency;
        let fetcher = HttpFetcher::new(&http_settings)?;
        let client = fetcher.client();

        let scorer = LexicalScorer::new().map_err(CrawlError::ScorerUnavailable)?;

        let controller = Self::with_components(
            request,
            settings.relevance_threshold,
            Arc::new(fetcher),
            Arc::new(scorer),
            extractor,
        )?;

        if settings.respect_robots_txt {
            Ok(controller.with_robots(Arc::new(HttpRobotsChecker::new(
                client,
                settings.user_agent.clone(),
            ))))
        } else {
            warn!("robots.txt enforcement is disabled");
            Ok(controller)
        }
    }

    /// Create a controller from explicit collaborators
    pub fn with_components(
        mut request: CrawlRequest,
        threshold: f32,
        fetcher: Arc<dyn PageFetcher>,
        scorer: Arc<dyn SimilarityScorer>,
        extractor: Extractor,
    ) -> Result<Self, CrawlError> {
        let seed = parse_crawlable(request.seed_url.trim())
            .ok_or_else(|| CrawlError::InvalidSeed(request.seed_url.clone()))?;
        request.seed_url = seed.to_string();

        request.topic = request.topic.trim().to_string();
        if request.topic.is_empty() {
            return Err(CrawlError::EmptyTopic);
        }
        if request.max_pages == 0 {
            return Err(CrawlError::InvalidLimit("max_pages"));
        }
        if request.concurrency == 0 {
            return Err(CrawlError::InvalidLimit("concurrency"));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CrawlError::InvalidThreshold(threshold));
        }

        let gate = RelevanceGate::new(scorer, &request.topic, threshold)
            .map_err(CrawlError::ScorerUnavailable)?;

        Ok(Self {
            frontier: Arc::new(Frontier::new(request.max_pages)),
            request,
            fetcher,
            robots: None,
            gate,
            extractor,
            progress: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Consult robots.txt before every fetch
    pub fn with_robots(mut self, robots: Arc<dyn RobotsChecker>) -> Self {
        self.robots = Some(robots);
        self
    }

    /// Report progress after every fetch attempt
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            frontier: self.frontier.clone(),
            cancelled: self.cancelled.clone(),
        }
    }

    /// Run the crawl to completion (or cancellation) and collect its findings
    pub async fn run(self) -> CrawlResult {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("crawl", run_id = %run_id);

        self.run_workers(run_id).instrument(span).await
    }

    async fn run_workers(self, run_id: String) -> CrawlResult {
        let CrawlerController {
            request,
            frontier,
            fetcher,
            robots,
            gate,
            extractor,
            progress,
            cancelled,
        } = self;

        info!(
            seed = %request.seed_url,
            topic = %request.topic,
            max_pages = request.max_pages,
            concurrency = request.concurrency,
            threshold = gate.threshold(),
            robots = robots.is_some(),
            "Starting crawl"
        );

        let metrics = MetricsCollector::new();
        let context = Arc::new(CrawlContext {
            frontier: frontier.clone(),
            fetcher,
            robots,
            gate,
            extractor,
            metrics: metrics.clone(),
            progress: ProgressReporter {
                callback: progress,
                last: Mutex::new(0.0),
                max_pages: request.max_pages,
            },
        });

        if !frontier.try_enqueue(&request.seed_url).await.is_added() {
            warn!(seed = %request.seed_url, "Seed URL was not enqueued");
        }

        let workers: Vec<_> = (0..request.concurrency)
            .map(|id| tokio::spawn(worker(id, context.clone()).in_current_span()))
            .collect();

        let mut titles = Vec::new();
        let mut dark_patterns = Vec::new();
        for outcome in join_all(workers).await {
            match outcome {
                Ok(found) => {
                    titles.extend(found.titles);
                    dark_patterns.extend(found.dark_patterns);
                }
                Err(e) => error!("Worker failed: {}", e),
            }
        }

        frontier.close().await;
        metrics.finish().await;

        let visited = frontier.visited().await;
        let cancelled = cancelled.load(Ordering::SeqCst);

        info!(
            pages = visited.len(),
            titles = titles.len(),
            dark_patterns = dark_patterns.len(),
            cancelled,
            "Crawl finished"
        );

        CrawlResult {
            run_id,
            visited,
            titles,
            dark_patterns,
            metrics: metrics.get_metrics().await,
            cancelled,
        }
    }
}
