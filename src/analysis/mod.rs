pub mod extractor;
pub mod patterns;
pub mod relevance;
pub mod text;

// Re-export common types
pub use patterns::PatternSet;
