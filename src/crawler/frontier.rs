use std::collections::{HashSet, VecDeque};

use tokio::sync::{Mutex, Notify};
use tracing::debug;
use url::Url;

use crate::crawler::task::CrawlTask;

/// Parse a URL and return it only if its structure is crawlable
pub fn parse_crawlable(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }

    if parsed.fragment().is_some() {
        return None;
    }

    let path = parsed.path().trim_start_matches('/').to_ascii_lowercase();
    if path.starts_with("javascript:") {
        return None;
    }

    Some(parsed)
}

/// Determine if a URL is structurally crawlable (http/https, no fragment, no script URL)
pub fn is_valid_structure(url: &str) -> bool {
    parse_crawlable(url).is_some()
}

/// Bookkeeping shared by all workers, guarded by a single lock
#[derive(Debug, Default)]
struct FrontierState {
    /// Tasks waiting to be fetched, in discovery order
    queue: VecDeque<CrawlTask>,

    /// Every URL ever placed into the queue
    enqueued: HashSet<String>,

    /// Every URL already fetched or attempted
    visited: HashSet<String>,

    /// Tasks handed out and not yet reported done
    in_flight: usize,

    /// Tasks handed out for fetching over the lifetime of the crawl
    admitted: usize,

    /// No further tasks will be handed out once set
    closed: bool,
}

/// Outcome of offering a URL to the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueue {
    Added(String),
    Duplicate,
    Invalid,
    Closed,
}

impl Enqueue {
    pub fn is_added(&self) -> bool {
        matches!(self, Enqueue::Added(_))
    }
}

/// FIFO queue of URLs to crawl with at-most-once enqueue and a page cap
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    max_pages: usize,
}

impl Frontier {
    /// Create an empty frontier that admits at most `max_pages` fetches
    pub fn new(max_pages: usize) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
            max_pages,
        }
    }

    /// Add a URL unless it is malformed or was already enqueued.
    ///
    /// URLs are keyed by their serialized form, so `https://Example.com`
    /// and `https://example.com/` are the same entry.
    pub async fn try_enqueue(&self, url: &str) -> Enqueue {
        let parsed = match parse_crawlable(url) {
            Some(parsed) => parsed,
            None => {
                debug!("Dropping malformed URL: {}", url);
                return Enqueue::Invalid;
            }
        };
        let key = parsed.to_string();

        let mut state = self.state.lock().await;
        if state.closed {
            return Enqueue::Closed;
        }
        if state.enqueued.contains(&key) || state.visited.contains(&key) {
            return Enqueue::Duplicate;
        }

        state.enqueued.insert(key.clone());
        state.queue.push_back(CrawlTask::new(key.clone()));
        drop(state);

        self.notify.notify_waiters();
        Enqueue::Added(key)
    }

    /// Wait for the next task.
    ///
    /// Returns `None` once the frontier is exhausted (nothing queued and
    /// nothing in flight) or closed. Once the page cap is reached, queued
    /// tasks are discarded instead of being handed out.
    pub async fn dequeue(&self) -> Option<CrawlTask> {
        loop {
            let notified = self.notify.notified();

            {
                let mut state = self.state.lock().await;

                if state.closed {
                    return None;
                }

                if state.admitted >= self.max_pages && !state.queue.is_empty() {
                    debug!(
                        discarded = state.queue.len(),
                        "Page cap reached, discarding queued tasks"
                    );
                    state.queue.clear();
                }

                if let Some(task) = state.queue.pop_front() {
                    state.in_flight += 1;
                    state.admitted += 1;
                    return Some(task);
                }

                if state.in_flight == 0 {
                    state.closed = true;
                    drop(state);
                    self.notify.notify_waiters();
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Record a URL as fetched (or attempted). Returns the visited count.
    pub async fn mark_visited(&self, url: &str) -> usize {
        let mut state = self.state.lock().await;
        state.visited.insert(url.to_string());
        state.visited.len()
    }

    /// Report that a dequeued task has been fully processed
    pub async fn task_done(&self) {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);

        self.notify.notify_waiters();
    }

    /// Stop handing out tasks and wake every waiting worker
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        drop(state);

        self.notify.notify_waiters();
    }

    /// Check whether a URL was already enqueued or visited
    pub async fn contains(&self, url: &str) -> bool {
        let state = self.state.lock().await;
        state.enqueued.contains(url) || state.visited.contains(url)
    }

    /// Check whether no further fetches will be admitted
    pub async fn is_saturated(&self) -> bool {
        self.state.lock().await.admitted >= self.max_pages
    }

    #[cfg(test)]
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    #[cfg(test)]
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Copy of the visited set
    pub async fn visited(&self) -> HashSet<String> {
        self.state.lock().await.visited.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready};

    #[test]
    fn test_valid_structure() {
        assert!(is_valid_structure("https://example.com/page"));
        assert!(is_valid_structure("http://example.com/search?q=data"));

        assert!(!is_valid_structure("ftp://example.com/file"));
        assert!(!is_valid_structure("mailto:someone@example.com"));
        assert!(!is_valid_structure("javascript:void(0)"));
        assert!(!is_valid_structure("https://example.com/javascript:alert(1)"));
        assert!(!is_valid_structure("https://example.com/page#section"));
        assert!(!is_valid_structure("not a url"));
    }

    #[tokio::test]
    async fn test_enqueue_once() {
        let frontier = Frontier::new(10);

        assert!(frontier.try_enqueue("https://example.com/a").await.is_added());
        assert_eq!(
            frontier.try_enqueue("https://example.com/a").await,
            Enqueue::Duplicate
        );
        assert_eq!(frontier.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_enqueue_uses_serialized_form() {
        let frontier = Frontier::new(10);

        assert_eq!(
            frontier.try_enqueue("https://EXAMPLE.com").await,
            Enqueue::Added("https://example.com/".to_string())
        );
        assert_eq!(
            frontier.try_enqueue("https://example.com/").await,
            Enqueue::Duplicate
        );
    }

    #[tokio::test]
    async fn test_malformed_url_does_not_pollute() {
        let frontier = Frontier::new(10);

        assert_eq!(
            frontier.try_enqueue("https://example.com/a#top").await,
            Enqueue::Invalid
        );
        assert!(!frontier.contains("https://example.com/a#top").await);
        assert_eq!(frontier.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_is_deduplicated() {
        let frontier = Arc::new(Frontier::new(100));
        let urls: Vec<String> = (0..20)
            .map(|i| format!("https://example.com/page/{}", i))
            .collect();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let frontier = frontier.clone();
            let urls = urls.clone();
            handles.push(tokio::spawn(async move {
                let mut added = 0;
                for url in urls.iter().chain(urls.iter()) {
                    if frontier.try_enqueue(url).await.is_added() {
                        added += 1;
                    }
                }
                added
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }

        assert_eq!(total, 20);
        assert_eq!(frontier.pending_count().await, 20);
    }

    #[tokio::test]
    async fn test_dequeue_fifo_then_exhausted() {
        let frontier = Frontier::new(10);
        frontier.try_enqueue("https://example.com/a").await;
        frontier.try_enqueue("https://example.com/b").await;

        let first = frontier.dequeue().await.unwrap();
        let second = frontier.dequeue().await.unwrap();
        assert_eq!(first.url, "https://example.com/a");
        assert_eq!(second.url, "https://example.com/b");

        frontier.task_done().await;
        frontier.task_done().await;

        assert!(frontier.dequeue().await.is_none());
        assert!(frontier.is_closed().await);
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_in_flight_work() {
        let frontier = Frontier::new(10);
        frontier.try_enqueue("https://example.com/a").await;
        let _task = frontier.dequeue().await.unwrap();

        let mut waiting = tokio_test::task::spawn(frontier.dequeue());
        assert_pending!(waiting.poll());

        frontier.try_enqueue("https://example.com/b").await;
        assert!(waiting.is_woken());

        let next = assert_ready!(waiting.poll());
        assert_eq!(next.unwrap().url, "https://example.com/b");
    }

    #[tokio::test]
    async fn test_last_task_done_releases_waiters() {
        let frontier = Frontier::new(10);
        frontier.try_enqueue("https://example.com/a").await;
        let _task = frontier.dequeue().await.unwrap();

        let mut waiting = tokio_test::task::spawn(frontier.dequeue());
        assert_pending!(waiting.poll());

        frontier.task_done().await;
        assert!(waiting.is_woken());
        assert!(assert_ready!(waiting.poll()).is_none());
    }

    #[tokio::test]
    async fn test_page_cap_discards_queued_tasks() {
        let frontier = Frontier::new(2);
        for path in ["a", "b", "c", "d"] {
            frontier
                .try_enqueue(&format!("https://example.com/{}", path))
                .await;
        }

        assert!(frontier.dequeue().await.is_some());
        assert!(frontier.dequeue().await.is_some());
        assert!(frontier.is_saturated().await);

        frontier.task_done().await;
        frontier.task_done().await;

        assert!(frontier.dequeue().await.is_none());
        assert_eq!(frontier.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let frontier = Frontier::new(10);
        frontier.try_enqueue("https://example.com/a").await;
        let _task = frontier.dequeue().await.unwrap();

        let mut waiting = tokio_test::task::spawn(frontier.dequeue());
        assert_pending!(waiting.poll());

        frontier.close().await;
        assert!(waiting.is_woken());
        assert!(assert_ready!(waiting.poll()).is_none());

        assert_eq!(
            frontier.try_enqueue("https://example.com/b").await,
            Enqueue::Closed
        );
    }

    #[tokio::test]
    async fn test_mark_visited_is_idempotent() {
        let frontier = Frontier::new(10);
        assert_eq!(frontier.mark_visited("https://example.com/a").await, 1);
        assert_eq!(frontier.mark_visited("https://example.com/a").await, 1);
        assert!(frontier.contains("https://example.com/a").await);
    }
}
