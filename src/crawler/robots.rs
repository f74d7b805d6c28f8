use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use texting_robots::Robot;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};
use url::Url;

/// Decides whether a URL may be fetched according to its site's robots.txt
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RobotsChecker: Send + Sync {
    /// Check a URL. Implementations must fail open: any error means allowed.
    async fn is_allowed(&self, url: &str) -> bool;
}

/// Fetches robots.txt once per origin and caches the parsed rules
pub struct HttpRobotsChecker {
    /// HTTP client
    client: Client,

    /// User agent the rules are evaluated for
    user_agent: String,

    /// Parsed rules per origin; `None` means everything is allowed.
    /// The slot is shared so concurrent checks on one origin load it once.
    cache: Mutex<HashMap<String, Arc<OnceCell<Option<Arc<Robot>>>>>>,
}

impl HttpRobotsChecker {
    pub fn new(client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch and parse the robots.txt for an origin, `None` on any failure
    async fn load(&self, robots_url: &str) -> Option<Arc<Robot>> {
        let response = match self.client.get(robots_url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch {}: {}", robots_url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(
                "No usable robots.txt at {} (status {})",
                robots_url,
                response.status()
            );
            return None;
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read {}: {}", robots_url, e);
                return None;
            }
        };

        match Robot::new(&self.user_agent, &body) {
            Ok(robot) => Some(Arc::new(robot)),
            Err(e) => {
                warn!("Failed to parse {}: {}", robots_url, e);
                None
            }
        }
    }
}

#[async_trait]
impl RobotsChecker for HttpRobotsChecker {
    async fn is_allowed(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return true,
        };
        let origin = parsed.origin().ascii_serialization();

        let robots_url = format!("{}/robots.txt", origin);
        let slot = self.cache.lock().await.entry(origin).or_default().clone();
        let robot = slot.get_or_init(|| self.load(&robots_url)).await;

        match robot {
            Some(robot) => robot.allowed(url),
            None => true,
        }
    }
}
