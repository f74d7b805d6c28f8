pub mod export;

// Re-export common types
pub use export::{export_result, ExportFormat, ExportedFiles};
