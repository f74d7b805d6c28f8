pub mod controller;
pub mod fetcher;
pub mod frontier;
pub mod robots;
pub mod task;

// Re-export common types
pub use controller::{CrawlRequest, CrawlerController};
pub use task::CrawlResult;
