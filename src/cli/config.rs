use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, debug, error};

use crate::analysis::PatternSet;
use crate::analysis::patterns::{DEFAULT_CSS_CLASSES, DEFAULT_KEYWORD_PATTERNS};
use crate::storage::ExportFormat;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CrawlerConfig {
    pub crawler: CrawlerSettings,
    pub patterns: PatternSettings,
    pub output: OutputSettings,
}

/// Crawler-specific settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CrawlerSettings {
    pub max_pages: usize,
    pub concurrency: usize,
    pub relevance_threshold: f32,  // Scores strictly above this pass
    pub respect_robots_txt: bool,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

/// Dark pattern tables
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PatternSettings {
    pub keywords: Vec<String>,  // Regular expressions, matched against lowercased page text
    pub css_classes: Vec<String>,
}

/// Where and how findings are written
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OutputSettings {
    pub directory: PathBuf,
    pub format: ExportFormat,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            max_pages: 50,
            concurrency: 10,
            relevance_threshold: 0.3,
            respect_robots_txt: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORD_PATTERNS.iter().map(|p| p.to_string()).collect(),
            css_classes: DEFAULT_CSS_CLASSES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            format: ExportFormat::Csv,
        }
    }
}

impl PatternSettings {
    /// Compile the tables
    pub fn compile(&self) -> Result<PatternSet> {
        PatternSet::new(&self.keywords, &self.css_classes)
            .context("Invalid dark pattern configuration")
    }
}

impl CrawlerConfig {
    /// Check the configuration before a crawl starts
    pub fn validate(&self) -> Result<()> {
        let crawler = &self.crawler;

        if crawler.max_pages == 0 {
            anyhow::bail!("max_pages must be at least 1");
        }
        if crawler.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if !(0.0..=1.0).contains(&crawler.relevance_threshold) {
            anyhow::bail!(
                "relevance_threshold must be within [0, 1], got {}",
                crawler.relevance_threshold
            );
        }
        if crawler.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }

        self.patterns.compile()?;

        Ok(())
    }

    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        let mut path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "focused-crawler", "focused-crawler") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        };

        // Create the profiles directory if it doesn't exist
        path.push("profiles");
        if !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                error!("Failed to create config directory: {}", e);
            }
        }

        path.pop();
        path
    }

    /// Load the default configuration
    pub fn load_default() -> Result<Self> {
        let config_path = Self::config_dir().join("default.yaml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_as_default()?;
            Ok(config)
        }
    }

    /// Load a configuration profile, "default" meaning the default configuration
    pub fn load_profile(profile: &str) -> Result<Self> {
        if profile == "default" {
            return Self::load_default();
        }

        let profile_path = Self::config_dir().join("profiles").join(format!("{}.yaml", profile));

        if profile_path.exists() {
            Self::load_from_file(&profile_path)
        } else {
            anyhow::bail!("Profile '{}' not found", profile)
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))
    }

    /// Parse configuration from YAML text; missing fields take their defaults
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Save the configuration as the default
    pub fn save_as_default(&self) -> Result<()> {
        let config_path = Self::config_dir().join("default.yaml");
        self.save_to_file(&config_path)
    }

    /// Save the configuration as a profile
    pub fn save_as_profile(&self, profile: &str) -> Result<PathBuf> {
        let profile_path = Self::config_dir().join("profiles").join(format!("{}.yaml", profile));
        self.save_to_file(&profile_path)?;
        Ok(profile_path)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// List all available profiles
    pub fn list_profiles() -> Result<Vec<String>> {
        let profiles_dir = Self::config_dir().join("profiles");

        if !profiles_dir.exists() {
            return Ok(vec![]);
        }

        let mut profiles = Vec::new();

        for entry in fs::read_dir(profiles_dir)? {
            let path = entry?.path();

            if path.is_file() && path.extension().map_or(false, |ext| ext == "yaml") {
                if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
                    profiles.push(name.to_string());
                }
            }
        }

        profiles.sort();
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CrawlerConfig::default();

        assert_eq!(config.crawler.max_pages, 50);
        assert_eq!(config.crawler.concurrency, 10);
        assert_eq!(config.crawler.relevance_threshold, 0.3);
        assert!(config.crawler.respect_robots_txt);
        assert_eq!(config.patterns.keywords.len(), DEFAULT_KEYWORD_PATTERNS.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = CrawlerConfig::from_yaml(
            "crawler:\n  max_pages: 5\n  respect_robots_txt: false\npatterns:\n  css_classes: [\"sneaky\"]\n",
        )
        .unwrap();

        assert_eq!(config.crawler.max_pages, 5);
        assert!(!config.crawler.respect_robots_txt);
        assert_eq!(config.crawler.concurrency, 10);
        assert_eq!(config.patterns.css_classes, vec!["sneaky".to_string()]);
        assert_eq!(config.patterns.keywords.len(), DEFAULT_KEYWORD_PATTERNS.len());
        assert_eq!(config.output.format, ExportFormat::Csv);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CrawlerConfig::default();
        config.crawler.relevance_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = CrawlerConfig::default();
        config.crawler.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = CrawlerConfig::default();
        config.patterns.keywords.push("hurry (up".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir()
            .join(format!("focused-crawler-{}", uuid::Uuid::new_v4()))
            .join("profile.yaml");

        let mut config = CrawlerConfig::default();
        config.crawler.max_pages = 7;
        config.save_to_file(&path).unwrap();

        let loaded = CrawlerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.crawler.max_pages, 7);

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
