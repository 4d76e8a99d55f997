//! Document ingestion: whitespace normalization and chunking

mod chunker;
mod cleaner;

pub use chunker::{SplitBoundary, TextChunker};
pub use cleaner::normalize_text;
