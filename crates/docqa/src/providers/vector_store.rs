//! Vector index client trait for storing and searching chunk embeddings

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{Chunk, ChunkKey, Embedding, RetrievedPassage, SearchFilter};

/// Similarity metric of a collection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine similarity
    #[default]
    Cosine,
    /// Raw dot product
    Dot,
}

impl DistanceMetric {
    /// Similarity between two vectors of equal length (higher is closer)
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self {
            Self::Dot => dot,
            Self::Cosine => {
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
        }
    }
}

/// Payload stored alongside each vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryPayload {
    pub document_id: String,
    pub chunk_index: u32,
    pub content_hash: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub char_start: usize,
    pub char_end: usize,
    pub indexed_at: DateTime<Utc>,
}

/// The persisted unit inside the vector store
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Composite key; writing the same key again replaces the entry
    pub key: ChunkKey,
    /// Embedding of the chunk text
    pub vector: Embedding,
    /// Stored payload
    pub payload: EntryPayload,
}

impl IndexEntry {
    /// Build an entry from a chunk and its embedding
    pub fn from_chunk(chunk: &Chunk, vector: Embedding) -> Self {
        Self {
            key: chunk.key.clone(),
            vector,
            payload: EntryPayload {
                document_id: chunk.key.document_id.clone(),
                chunk_index: chunk.key.chunk_index,
                content_hash: chunk.content_hash.clone(),
                text: chunk.text.clone(),
                filename: chunk.metadata.filename.clone(),
                created_at: chunk.metadata.created_at,
                tags: chunk.metadata.tags.clone(),
                char_start: chunk.char_start,
                char_end: chunk.char_end,
                indexed_at: Utc::now(),
            },
        }
    }
}

/// Search hit
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub key: ChunkKey,
    pub payload: EntryPayload,
    /// Similarity under the collection metric (higher is closer)
    pub score: f32,
}

impl ScoredEntry {
    /// Convert into a passage for a retrieval result
    pub fn into_passage(self) -> RetrievedPassage {
        RetrievedPassage {
            key: self.key,
            text: self.payload.text,
            score: self.score,
            filename: self.payload.filename,
            tags: self.payload.tags,
            content_hash: self.payload.content_hash,
            char_start: self.payload.char_start,
            char_end: self.payload.char_end,
        }
    }
}

/// Stored key and content hash of one entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntryManifest {
    pub key: ChunkKey,
    pub content_hash: String,
}

/// Trait for a vector index holding one named collection
///
/// Implementations:
/// - `InMemoryVectorIndex`: exact search in process memory
/// - `QdrantIndex`: Qdrant over its REST API
#[async_trait]
pub trait VectorIndexClient: Send + Sync {
    /// Create the collection if missing. Fails with `DimensionMismatch` when
    /// it exists with another dimension.
    async fn ensure_collection(&self, dimension: usize, metric: DistanceMetric) -> Result<()>;

    /// Insert or replace entries by key.
    ///
    /// Entries that could not be written are reported through
    /// `Error::PartialUpsertFailure`; all others are stored.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Remove every entry of a document, returning how many were removed
    async fn delete_by_document(&self, document_id: &str) -> Result<usize>;

    /// Nearest neighbours, highest score first, with the filter applied
    /// inside the search
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredEntry>>;

    /// Keys and content hashes stored for a document, ordered by key
    async fn document_manifest(&self, document_id: &str) -> Result<Vec<EntryManifest>>;

    /// Number of entries matching a filter
    async fn count(&self, filter: &SearchFilter) -> Result<usize>;

    /// Check if the store is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
