pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::storage::ExportFormat;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a focused crawl from a seed URL
    Crawl {
        /// Seed URL to start crawling from
        #[arg(required = true)]
        url: String,

        /// Topic that pages and links are scored against
        #[arg(short, long)]
        topic: String,

        /// Configuration profile to use
        #[arg(short, long, default_value = "default")]
        profile: String,

        /// Maximum number of pages to fetch
        #[arg(short, long)]
        limit: Option<usize>,

        /// Number of concurrent workers
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Relevance threshold; scores strictly above it pass
        #[arg(long)]
        threshold: Option<f32>,

        /// Do not consult robots.txt
        #[arg(long)]
        ignore_robots: bool,

        /// Directory the findings are written to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<ExportFormat>,
    },

    /// Manage configuration profiles
    Config {
        /// Profile name to manage
        #[arg(required = false)]
        profile: Option<String>,

        /// List all available profiles
        #[arg(short, long)]
        list: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Crawl {
            url,
            topic,
            profile,
            limit,
            concurrency,
            threshold,
            ignore_robots,
            output,
            format,
        } => {
            info!("Starting crawl on {} about '{}' with profile {}", url, topic, profile);
            let overrides = commands::CrawlOverrides {
                limit,
                concurrency,
                threshold,
                ignore_robots,
                output,
                format,
            };
            commands::crawl(url, topic, profile, overrides).await
        },
        Commands::Config { profile, list } => {
            if list {
                info!("Listing all configuration profiles");
                commands::list_profiles().await
            } else if let Some(profile_name) = profile {
                info!("Managing configuration profile: {}", profile_name);
                commands::manage_profile(profile_name).await
            } else {
                info!("Showing current configuration");
                commands::show_config().await
            }
        },
    }
}
