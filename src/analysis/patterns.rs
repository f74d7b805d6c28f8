use regex::Regex;
use thiserror::Error;

/// Phrases typical of false urgency, fake scarcity and confirmshaming
pub const DEFAULT_KEYWORD_PATTERNS: &[&str] = &[
    r"only \d+ left in stock",
    r"limited time offer",
    r"offer expires (today|soon)",
    r"hurry up",
    r"high demand",
    r"sneak into basket",
    r"confirmshaming",
];

/// Class names commonly attached to manipulative UI elements
pub const DEFAULT_CSS_CLASSES: &[&str] = &[
    "dark-pattern",
    "confirm-shame",
    "low-stock",
    "high-demand",
    "hidden-cost",
    "visually-hidden",
];

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Invalid keyword pattern '{pattern}': {source}")]
    InvalidKeyword {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid CSS class name: '{0}'")]
    InvalidClass(String),

    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),
}

/// Compiled dark pattern tables
#[derive(Debug, Clone)]
pub struct PatternSet {
    keywords: Vec<Regex>,
    css_classes: Vec<String>,
}

impl PatternSet {
    /// Compile keyword patterns and check class names
    pub fn new<K, C>(keywords: K, css_classes: C) -> Result<Self, PatternError>
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|source| PatternError::InvalidKeyword {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let css_classes = css_classes
            .into_iter()
            .map(|class| {
                let class = class.as_ref();
                if class.is_empty() || class.chars().any(char::is_whitespace) {
                    Err(PatternError::InvalidClass(class.to_string()))
                } else {
                    Ok(class.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            keywords,
            css_classes,
        })
    }

    /// The built-in tables
    pub fn builtin() -> Result<Self, PatternError> {
        Self::new(DEFAULT_KEYWORD_PATTERNS, DEFAULT_CSS_CLASSES)
    }

    pub fn keywords(&self) -> &[Regex] {
        &self.keywords
    }

    pub fn css_classes(&self) -> &[String] {
        &self.css_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_compile() {
        let patterns = PatternSet::builtin().unwrap();
        assert_eq!(patterns.keywords().len(), DEFAULT_KEYWORD_PATTERNS.len());
        assert_eq!(patterns.css_classes().len(), DEFAULT_CSS_CLASSES.len());
    }

    #[test]
    fn test_invalid_keyword_is_rejected() {
        let err = PatternSet::new(["only (\\d+ left"], DEFAULT_CSS_CLASSES).unwrap_err();
        assert!(matches!(err, PatternError::InvalidKeyword { .. }));
    }

    #[test]
    fn test_invalid_class_is_rejected() {
        let err = PatternSet::new(DEFAULT_KEYWORD_PATTERNS, ["low stock"]).unwrap_err();
        assert!(matches!(err, PatternError::InvalidClass(_)));
    }
}
