//! docqa: indexing and retrieval core for document question answering
//!
//! Documents arrive as extracted text. They are normalized, split into
//! token-bounded overlapping chunks, embedded, and written to a vector index
//! keyed by `(document_id, chunk_index)`. Questions are embedded the same way
//! and answered with ranked, deduplicated passages ready to hand to an answer
//! generator.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod types;

pub use config::RagConfig;
pub use coordinator::{HealthStatus, PipelineCoordinator};
pub use error::{Error, ErrorKind, Result};
pub use types::{
    Chunk, ChunkKey, DeleteReport, Document, DocumentMetadata, IndexOutcome, IndexReport,
    QueryOptions, RetrievalResult, RetrievedPassage, SearchFilter,
};
