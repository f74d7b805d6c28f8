use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::analysis::patterns::{PatternError, PatternSet};
use crate::analysis::relevance::RelevanceGate;
use crate::analysis::text::{element_text, truncate_with_marker, visible_text};
use crate::crawler::task::{DarkPatternFinding, TitleFinding};

/// Maximum characters of element text kept as context for a CSS class finding
pub const CONTEXT_MAX_CHARS: usize = 100;

/// Findings extracted from one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub titles: Vec<TitleFinding>,
    pub dark_patterns: Vec<DarkPatternFinding>,
}

/// An outbound link with the text a reader would click on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Absolute URL, resolved against the page URL
    pub url: String,

    /// Whitespace-normalized anchor text (may be empty)
    pub anchor_text: String,
}

/// Everything the engine needs from a fetched page, with the DOM already dropped
#[derive(Debug, Clone, PartialEq)]
pub enum PageInspection {
    /// No visible text; nothing is scored, extracted or followed
    Empty,

    Parsed {
        /// Page relevance score
        score: f32,
        /// Whether the page passed the relevance gate
        relevant: bool,
        /// Findings, empty unless the page is relevant
        extraction: Extraction,
        /// Outbound links in document order
        links: Vec<Link>,
    },
}

/// Title and dark pattern extraction over parsed HTML
pub struct Extractor {
    patterns: PatternSet,
    heading: Selector,
    anchor: Selector,
}

impl Extractor {
    pub fn new(patterns: PatternSet) -> Result<Self, PatternError> {
        let heading =
            Selector::parse("h1").map_err(|_| PatternError::InvalidSelector("h1".to_string()))?;
        let anchor = Selector::parse("a[href]")
            .map_err(|_| PatternError::InvalidSelector("a[href]".to_string()))?;

        Ok(Self {
            patterns,
            heading,
            anchor,
        })
    }

    /// Extract titles and dark patterns from raw HTML, ignoring relevance
    #[cfg(test)]
    pub fn extract(&self, html: &str, url: &str) -> Extraction {
        let document = Html::parse_document(html);
        let text = visible_text(&document);
        self.extract_document(&document, &text, url)
    }

    /// Parse a fetched page, run the relevance gate, and extract when it passes.
    ///
    /// Links are collected whether or not the page itself is relevant.
    pub fn inspect(&self, html: &str, url: &str, gate: &RelevanceGate) -> PageInspection {
        let document = Html::parse_document(html);
        let text = visible_text(&document);
        if text.is_empty() {
            return PageInspection::Empty;
        }

        let score = gate.score(&text);
        let relevant = gate.accepts(score);
        let extraction = if relevant {
            self.extract_document(&document, &text, url)
        } else {
            Extraction::default()
        };

        PageInspection::Parsed {
            score,
            relevant,
            extraction,
            links: self.links(&document, url),
        }
    }

    fn extract_document(&self, document: &Html, text: &str, url: &str) -> Extraction {
        let mut extraction = Extraction::default();

        for heading in document.select(&self.heading) {
            let title = element_text(heading);
            if !title.is_empty() {
                extraction.titles.push(TitleFinding {
                    url: url.to_string(),
                    title,
                });
            }
        }

        let lowered = text.to_lowercase();
        for pattern in self.patterns.keywords() {
            for found in pattern.find_iter(&lowered) {
                extraction
                    .dark_patterns
                    .push(DarkPatternFinding::keyword(url, found.as_str()));
            }
        }

        for class in self.patterns.css_classes() {
            for element in elements_with_class(document, class) {
                let context = truncate_with_marker(&element_text(element), CONTEXT_MAX_CHARS);
                extraction
                    .dark_patterns
                    .push(DarkPatternFinding::css_class(url, class, context));
            }
        }

        extraction
    }

    /// Outbound links resolved against the page URL, deduplicated, in document order
    pub fn links(&self, document: &Html, url: &str) -> Vec<Link> {
        let base = match Url::parse(url) {
            Ok(base) => base,
            Err(_) => return Vec::new(),
        };

        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for anchor in document.select(&self.anchor) {
            let href = match anchor.value().attr("href") {
                Some(href) => href.trim(),
                None => continue,
            };

            let resolved = match base.join(href) {
                Ok(resolved) => resolved.to_string(),
                Err(_) => continue,
            };

            if seen.insert(resolved.clone()) {
                links.push(Link {
                    url: resolved,
                    anchor_text: element_text(anchor),
                });
            }
        }

        links
    }
}

fn elements_with_class<'a>(
    document: &'a Html,
    class: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(move |element| element.value().classes().any(|c| c == class))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::relevance::{SimilarityScorer, ScorerError, TargetProfile};
    use crate::crawler::task::PatternType;
    use std::collections::HashMap;
    use std::sync::Arc;

    const FIXTURE: &str = r#"<html><body>
        <h1>Data Mining 101</h1>
        <p>only 3 left in stock, hurry up</p>
        <div class="low-stock">Almost gone</div>
    </body></html>"#;

    struct FixedScorer(f32);

    impl SimilarityScorer for FixedScorer {
        fn prepare(&self, topic: &str) -> Result<TargetProfile, ScorerError> {
            Ok(TargetProfile {
                topic: topic.to_string(),
                terms: HashMap::new(),
            })
        }

        fn score(&self, _text: &str, _target: &TargetProfile) -> f32 {
            self.0
        }
    }

    fn extractor() -> Extractor {
        Extractor::new(PatternSet::builtin().unwrap()).unwrap()
    }

    fn gate(score: f32) -> RelevanceGate {
        RelevanceGate::new(Arc::new(FixedScorer(score)), "data mining", 0.3).unwrap()
    }

    #[test]
    fn test_extract_fixture() {
        let url = "https://shop.example.com/";
        let extraction = extractor().extract(FIXTURE, url);

        assert_eq!(
            extraction.titles,
            vec![TitleFinding {
                url: url.to_string(),
                title: "Data Mining 101".to_string(),
            }]
        );
        assert_eq!(
            extraction.dark_patterns,
            vec![
                DarkPatternFinding::keyword(url, "only 3 left in stock"),
                DarkPatternFinding::keyword(url, "hurry up"),
                DarkPatternFinding::css_class(url, "low-stock", "Almost gone".to_string()),
            ]
        );
    }

    #[test]
    fn test_keyword_reports_whole_match() {
        let extraction = extractor().extract(
            "<p>This Offer Expires Today! Limited time offer.</p>",
            "https://example.com/",
        );

        let findings: Vec<&str> = extraction
            .dark_patterns
            .iter()
            .map(|f| f.finding.as_str())
            .collect();
        assert_eq!(findings, vec!["limited time offer", "offer expires today"]);
        assert!(extraction
            .dark_patterns
            .iter()
            .all(|f| f.pattern_type == PatternType::Keyword && f.context.is_none()));
    }

    #[test]
    fn test_css_context_is_truncated() {
        let long_text = "x".repeat(150);
        let html = format!(
            r#"<div class="promo hidden-cost">{}</div><span class="visually-hidden"></span>"#,
            long_text
        );
        let extraction = extractor().extract(&html, "https://example.com/");

        assert_eq!(extraction.dark_patterns.len(), 2);
        let context = extraction.dark_patterns[0].context.as_deref().unwrap();
        assert_eq!(context, format!("{}...", "x".repeat(100)));
        assert_eq!(extraction.dark_patterns[1].finding, "visually-hidden");
        assert_eq!(extraction.dark_patterns[1].context.as_deref(), Some(""));
    }

    #[test]
    fn test_empty_headings_are_skipped() {
        let extraction =
            extractor().extract("<h1>  </h1><h1>Second <em>Title</em></h1><h2>Sub</h2>", "https://example.com/");

        assert_eq!(extraction.titles.len(), 1);
        assert_eq!(extraction.titles[0].title, "Second Title");
    }

    #[test]
    fn test_links_are_resolved_and_deduplicated() {
        let html = r##"<body>
            <a href="/guide">Data guide</a>
            <a href="https://other.example.org/page">Other</a>
            <a href="/guide">Same guide</a>
            <a href="#top">Top</a>
            <a>No href</a>
        </body>"##;
        let document = Html::parse_document(html);
        let links = extractor().links(&document, "https://example.com/start/");

        assert_eq!(
            links,
            vec![
                Link {
                    url: "https://example.com/guide".to_string(),
                    anchor_text: "Data guide".to_string(),
                },
                Link {
                    url: "https://other.example.org/page".to_string(),
                    anchor_text: "Other".to_string(),
                },
                Link {
                    url: "https://example.com/start/#top".to_string(),
                    anchor_text: "Top".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_inspect_relevant_page() {
        match extractor().inspect(FIXTURE, "https://example.com/", &gate(0.9)) {
            PageInspection::Parsed {
                relevant,
                extraction,
                ..
            } => {
                assert!(relevant);
                assert_eq!(extraction.titles.len(), 1);
                assert_eq!(extraction.dark_patterns.len(), 3);
            }
            PageInspection::Empty => panic!("fixture has text"),
        }
    }

    #[test]
    fn test_inspect_at_threshold_skips_extraction_but_keeps_links() {
        let html = format!(r#"{}<a href="/next">next</a>"#, FIXTURE);
        match extractor().inspect(&html, "https://example.com/", &gate(0.3)) {
            PageInspection::Parsed {
                relevant,
                extraction,
                links,
                ..
            } => {
                assert!(!relevant);
                assert_eq!(extraction, Extraction::default());
                assert_eq!(links.len(), 1);
            }
            PageInspection::Empty => panic!("page has text"),
        }
    }

    #[test]
    fn test_inspect_empty_page() {
        let html = r#"<html><body><a href="/next"><img src="a.png"></a></body></html>"#;
        assert_eq!(
            extractor().inspect(html, "https://example.com/", &gate(0.9)),
            PageInspection::Empty
        );
    }
}
