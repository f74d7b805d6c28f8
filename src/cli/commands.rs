use anyhow::{Result, Context};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::config::CrawlerConfig;
use crate::crawler::{CrawlRequest, CrawlResult, CrawlerController};
use crate::storage::{export_result, ExportFormat};

/// Command line values that take precedence over the profile
#[derive(Debug, Default)]
pub struct CrawlOverrides {
    pub limit: Option<usize>,
    pub concurrency: Option<usize>,
    pub threshold: Option<f32>,
    pub ignore_robots: bool,
    pub output: Option<PathBuf>,
    pub format: Option<ExportFormat>,
}

impl CrawlOverrides {
    fn apply(self, config: &mut CrawlerConfig) {
        if let Some(l) = self.limit {
            config.crawler.max_pages = l;
        }
        if let Some(c) = self.concurrency {
            config.crawler.concurrency = c;
        }
        if let Some(t) = self.threshold {
            config.crawler.relevance_threshold = t;
        }
        if self.ignore_robots {
            config.crawler.respect_robots_txt = false;
        }
        if let Some(o) = self.output {
            config.output.directory = o;
        }
        if let Some(f) = self.format {
            config.output.format = f;
        }
    }
}

/// Run a focused crawl and export its findings
pub async fn crawl(url: String, topic: String, profile: String, overrides: CrawlOverrides) -> Result<()> {
    // Load the specified profile configuration
    let mut config = CrawlerConfig::load_profile(&profile)
        .context(format!("Failed to load profile: {}", profile))?;

    overrides.apply(&mut config);
    config.validate().context("Invalid crawl configuration")?;

    let request = CrawlRequest {
        seed_url: url,
        topic,
        max_pages: config.crawler.max_pages,
        concurrency: config.crawler.concurrency,
    };

    // Log every tenth of the way
    let last_decile = Arc::new(AtomicUsize::new(0));
    let controller = CrawlerController::new(&config, request)
        .context("Failed to start crawl")?
        .with_progress(Arc::new(move |fraction: f32| {
            let decile = (fraction * 10.0).floor() as usize;
            if decile > last_decile.fetch_max(decile, Ordering::Relaxed) {
                info!("Progress: {:.0}%", fraction * 100.0);
            }
        }));

    // Ctrl-C stops the crawl; whatever was found so far is still exported
    let cancel = controller.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after in-flight pages");
            cancel.cancel().await;
        }
    });

    let result = controller.run().await;
    interrupt.abort();

    print_summary(&result);

    let files = export_result(&result, &config.output.directory, config.output.format)
        .context("Failed to export findings")?;

    println!("Titles written to: {}", files.titles.display());
    match files.dark_patterns {
        Some(path) => println!("Dark patterns written to: {}", path.display()),
        None => println!("No dark patterns found."),
    }

    Ok(())
}

fn print_summary(result: &CrawlResult) {
    let metrics = &result.metrics;

    println!("Run ID: {}", result.run_id);
    if result.cancelled {
        println!("Status: cancelled");
    } else {
        println!("Status: completed");
    }
    println!("Pages visited: {}", result.pages_visited());
    println!(
        "Fetches: {} ok, {} failed, {} blocked by robots.txt",
        metrics.fetch_successes, metrics.fetch_failures, metrics.robots_denied
    );
    println!(
        "Pages: {} relevant, {} irrelevant, {} empty",
        metrics.pages_relevant, metrics.pages_irrelevant, metrics.empty_pages
    );
    println!(
        "Links: {} scored, {} enqueued",
        metrics.links_scored, metrics.links_enqueued
    );
    if metrics.task_panics > 0 {
        println!("Tasks that panicked: {}", metrics.task_panics);
    }
    if let Some(secs) = metrics.duration_secs() {
        println!("Duration: {:.1}s", secs);
    }
    println!("Titles found: {}", result.titles.len());
    println!("Dark patterns found: {}", result.dark_patterns.len());
}

/// List all available configuration profiles
pub async fn list_profiles() -> Result<()> {
    let profiles = CrawlerConfig::list_profiles()?;

    println!("Available configuration profiles:");
    println!("  - default");
    for profile in profiles {
        println!("  - {}", profile);
    }

    Ok(())
}

/// Show a profile, creating it from the defaults when it does not exist
pub async fn manage_profile(profile_name: String) -> Result<()> {
    match CrawlerConfig::load_profile(&profile_name) {
        Ok(config) => {
            println!("Profile: {}", profile_name);
            println!("{}", serde_yaml::to_string(&config)?);
        },
        Err(_) => {
            warn!("Profile '{}' does not exist. Creating a default profile.", profile_name);
            let config = CrawlerConfig::default();
            let path = config.save_as_profile(&profile_name)?;
            println!("Created default profile: {} ({})", profile_name, path.display());
        }
    }

    Ok(())
}

/// Show the current configuration
pub async fn show_config() -> Result<()> {
    let config = CrawlerConfig::load_default()?;
    println!("Current configuration:");
    println!("{}", serde_yaml::to_string(&config)?);

    Ok(())
}
