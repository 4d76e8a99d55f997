//! Retrieval: query embedding, vector search, ranking and deduplication

mod search;

pub use search::{select_passages, DedupPolicy, RetrievalPipeline};
