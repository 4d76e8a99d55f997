//! Core types for documents, chunks, queries and results

pub mod document;
pub mod query;
pub mod response;

pub use document::{content_hash, Chunk, ChunkKey, Document, DocumentMetadata};
pub use query::{QueryOptions, SearchFilter};
pub use response::{DeleteReport, IndexOutcome, IndexReport, RetrievalResult, RetrievedPassage};

/// Dense vector for one chunk or query
pub type Embedding = Vec<f32>;
