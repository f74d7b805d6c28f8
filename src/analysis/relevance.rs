use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("Scorer backend failed to initialize: {0}")]
    Backend(String),

    #[error("Topic '{0}' has no terms the scorer can match")]
    EmptyProfile(String),
}

/// Precomputed representation of the crawl topic
#[derive(Debug, Clone, PartialEq)]
pub struct TargetProfile {
    /// Topic as given by the user
    pub topic: String,

    /// Term weights derived from the topic
    pub terms: HashMap<String, f32>,
}

/// Pluggable text similarity capability.
///
/// `prepare` runs once per crawl; `score` runs for every page text and
/// anchor text and must return a value in `[0, 1]`.
pub trait SimilarityScorer: Send + Sync {
    fn prepare(&self, topic: &str) -> Result<TargetProfile, ScorerError>;

    fn score(&self, text: &str, target: &TargetProfile) -> f32;
}

const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "how",
    "in", "into", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "what",
    "when", "where", "which", "who", "why", "will", "with",
];

/// Bag-of-words scorer: the weighted share of topic terms that occur in the text
pub struct LexicalScorer {
    token: Regex,
    stop_words: HashSet<&'static str>,
}

impl LexicalScorer {
    pub fn new() -> Result<Self, ScorerError> {
        let token = Regex::new(r"\w+").map_err(|e| ScorerError::Backend(e.to_string()))?;

        Ok(Self {
            token,
            stop_words: STOP_WORDS.iter().copied().collect(),
        })
    }

    /// Lowercased, stop-word free terms with plural "s" folded
    fn terms<'a>(&'a self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        self.token
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|term| term.chars().count() > 1 && !self.stop_words.contains(term.as_str()))
            .map(|term| {
                if term.len() > 3 && term.ends_with('s') && !term.ends_with("ss") {
                    term[..term.len() - 1].to_string()
                } else {
                    term
                }
            })
    }
}

impl SimilarityScorer for LexicalScorer {
    fn prepare(&self, topic: &str) -> Result<TargetProfile, ScorerError> {
        let mut terms = HashMap::new();
        for term in self.terms(topic) {
            *terms.entry(term).or_insert(0.0) += 1.0;
        }

        if terms.is_empty() {
            return Err(ScorerError::EmptyProfile(topic.to_string()));
        }

        Ok(TargetProfile {
            topic: topic.to_string(),
            terms,
        })
    }

    fn score(&self, text: &str, target: &TargetProfile) -> f32 {
        let total: f32 = target.terms.values().sum();
        if total <= 0.0 {
            return 0.0;
        }

        let present: HashSet<String> = self.terms(text).collect();
        let matched: f32 = target
            .terms
            .iter()
            .filter(|(term, _)| present.contains(*term))
            .map(|(_, weight)| weight)
            .sum();

        (matched / total).clamp(0.0, 1.0)
    }
}

/// Accept/reject decision shared by page and link relevance
pub struct RelevanceGate {
    scorer: Arc<dyn SimilarityScorer>,
    target: TargetProfile,
    threshold: f32,
}

impl RelevanceGate {
    /// Build the topic profile once; fails if the scorer cannot represent it
    pub fn new(
        scorer: Arc<dyn SimilarityScorer>,
        topic: &str,
        threshold: f32,
    ) -> Result<Self, ScorerError> {
        let target = scorer.prepare(topic)?;

        Ok(Self {
            scorer,
            target,
            threshold,
        })
    }

    pub fn score(&self, text: &str) -> f32 {
        self.scorer.score(text, &self.target)
    }

    /// Scores strictly above the threshold pass
    pub fn accepts(&self, score: f32) -> bool {
        score > self.threshold
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}
