use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::Metrics;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrawlTask {
    /// URL to crawl
    pub url: String,
}

impl CrawlTask {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// A top-level heading extracted from a relevant page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleFinding {
    #[serde(rename = "URL")]
    pub url: String,

    #[serde(rename = "Title")]
    pub title: String,
}

/// How a dark pattern was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternType {
    /// Regular expression match against the page text
    #[serde(rename = "Keyword")]
    Keyword,

    /// Element carrying a known dark-pattern class
    #[serde(rename = "CSS Class")]
    CssClass,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternType::Keyword => write!(f, "Keyword"),
            PatternType::CssClass => write!(f, "CSS Class"),
        }
    }
}

/// One dark pattern signal found on a relevant page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DarkPatternFinding {
    #[serde(rename = "URL")]
    pub url: String,

    #[serde(rename = "Pattern_Type")]
    pub pattern_type: PatternType,

    /// Matched substring for keywords, class name for CSS classes
    #[serde(rename = "Finding")]
    pub finding: String,

    /// Element text for CSS class findings, absent for keywords
    #[serde(rename = "Context")]
    pub context: Option<String>,
}

impl DarkPatternFinding {
    pub fn keyword(url: &str, matched: &str) -> Self {
        Self {
            url: url.to_string(),
            pattern_type: PatternType::Keyword,
            finding: matched.to_string(),
            context: None,
        }
    }

    pub fn css_class(url: &str, class: &str, context: String) -> Self {
        Self {
            url: url.to_string(),
            pattern_type: PatternType::CssClass,
            finding: class.to_string(),
            context: Some(context),
        }
    }
}

/// Final snapshot of a crawl, handed to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    /// Identifier of the crawl run, as used in the logs
    pub run_id: String,

    /// Every URL that was fetched or attempted
    pub visited: HashSet<String>,

    /// Headings found on relevant pages
    pub titles: Vec<TitleFinding>,

    /// Dark pattern signals found on relevant pages
    pub dark_patterns: Vec<DarkPatternFinding>,

    /// Counters collected during the run
    pub metrics: Metrics,

    /// Whether the crawl was stopped before the frontier drained
    pub cancelled: bool,
}

impl CrawlResult {
    pub fn pages_visited(&self) -> usize {
        self.visited.len()
    }
}
