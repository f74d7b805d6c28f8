use anyhow::{Result, Context};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::crawler::task::{CrawlResult, DarkPatternFinding, TitleFinding};

const TITLE_HEADER: [&str; 2] = ["URL", "Title"];
const DARK_PATTERN_HEADER: [&str; 4] = ["URL", "Pattern_Type", "Finding", "Context"];

/// Output format of the findings tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Files written by an export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub titles: PathBuf,

    /// Not written when there are no dark pattern findings
    pub dark_patterns: Option<PathBuf>,
}

/// Serialize rows under a fixed header, so an empty table still has one
fn to_csv<T: Serialize>(header: &[&str], rows: &[T]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush CSV writer")?;

    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Titles table as CSV; the header is always present
pub fn titles_to_csv(titles: &[TitleFinding]) -> Result<String> {
    to_csv(&TITLE_HEADER, titles)
}

/// Dark pattern table as CSV; empty string when there is nothing to report
pub fn dark_patterns_to_csv(findings: &[DarkPatternFinding]) -> Result<String> {
    if findings.is_empty() {
        return Ok(String::new());
    }
    to_csv(&DARK_PATTERN_HEADER, findings)
}

/// Any table as a JSON array of row objects
pub fn rows_to_json<T: Serialize>(rows: &[T]) -> Result<String> {
    serde_json::to_string_pretty(rows).context("Failed to serialize findings as JSON")
}

/// Write the findings of a crawl into `dir`
pub fn export_result(result: &CrawlResult, dir: &Path, format: ExportFormat) -> Result<ExportedFiles> {
    fs::create_dir_all(dir)
        .context(format!("Failed to create output directory: {}", dir.display()))?;

    let (titles, dark_patterns) = match format {
        ExportFormat::Csv => (
            titles_to_csv(&result.titles)?,
            dark_patterns_to_csv(&result.dark_patterns)?,
        ),
        ExportFormat::Json => (
            rows_to_json(&result.titles)?,
            if result.dark_patterns.is_empty() {
                String::new()
            } else {
                rows_to_json(&result.dark_patterns)?
            },
        ),
    };

    let titles_path = dir.join(format!("titles.{}", format.extension()));
    fs::write(&titles_path, titles)
        .context(format!("Failed to write {}", titles_path.display()))?;
    debug!("Wrote {} titles to {}", result.titles.len(), titles_path.display());

    let dark_patterns_path = if dark_patterns.is_empty() {
        info!("No dark patterns found, skipping dark pattern export");
        None
    } else {
        let path = dir.join(format!("dark_patterns.{}", format.extension()));
        fs::write(&path, dark_patterns)
            .context(format!("Failed to write {}", path.display()))?;
        debug!("Wrote {} dark patterns to {}", result.dark_patterns.len(), path.display());
        Some(path)
    };

    Ok(ExportedFiles {
        titles: titles_path,
        dark_patterns: dark_patterns_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Metrics;
    use std::collections::HashSet;

    fn findings() -> Vec<DarkPatternFinding> {
        vec![
            DarkPatternFinding::keyword("https://shop.test/", "hurry up"),
            DarkPatternFinding::css_class("https://shop.test/", "low-stock", "Almost, gone".to_string()),
        ]
    }

    fn result(dark_patterns: Vec<DarkPatternFinding>) -> CrawlResult {
        CrawlResult {
            run_id: "test".to_string(),
            visited: HashSet::from(["https://shop.test/".to_string()]),
            titles: vec![TitleFinding {
                url: "https://shop.test/".to_string(),
                title: "Data Mining 101".to_string(),
            }],
            dark_patterns,
            metrics: Metrics::default(),
            cancelled: false,
        }
    }

    #[test]
    fn test_titles_csv() {
        assert_eq!(titles_to_csv(&[]).unwrap(), "URL,Title\n");

        let csv = titles_to_csv(&result(vec![]).titles).unwrap();
        assert_eq!(csv, "URL,Title\nhttps://shop.test/,Data Mining 101\n");
    }

    #[test]
    fn test_dark_patterns_csv() {
        assert_eq!(dark_patterns_to_csv(&[]).unwrap(), "");

        let csv = dark_patterns_to_csv(&findings()).unwrap();
        assert_eq!(
            csv,
            "URL,Pattern_Type,Finding,Context\n\
             https://shop.test/,Keyword,hurry up,\n\
             https://shop.test/,CSS Class,low-stock,\"Almost, gone\"\n"
        );
    }

    #[test]
    fn test_json_rows_use_column_names() {
        let json = rows_to_json(&findings()).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(rows[0]["Pattern_Type"], "Keyword");
        assert_eq!(rows[0]["Context"], serde_json::Value::Null);
        assert_eq!(rows[1]["Pattern_Type"], "CSS Class");
        assert_eq!(rows[1]["Context"], "Almost, gone");
    }

    #[test]
    fn test_export_result_skips_empty_dark_patterns() {
        let dir = std::env::temp_dir().join(format!("focused-crawler-{}", uuid::Uuid::new_v4()));

        let files = export_result(&result(vec![]), &dir, ExportFormat::Csv).unwrap();
        assert_eq!(files.titles, dir.join("titles.csv"));
        assert!(files.dark_patterns.is_none());
        assert!(!dir.join("dark_patterns.csv").exists());

        let files = export_result(&result(findings()), &dir, ExportFormat::Json).unwrap();
        let written = fs::read_to_string(files.dark_patterns.unwrap()).unwrap();
        assert!(written.contains("low-stock"));

        fs::remove_dir_all(&dir).ok();
    }
}
