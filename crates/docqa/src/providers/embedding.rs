//! Embedder trait for turning text into vectors

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::Embedding;

/// Trait for generating text embeddings
///
/// Implementations:
/// - `OllamaEmbedder`: Ollama-compatible HTTP service (nomic-embed-text)
/// - `HashEmbedder`: offline feature hashing, for development and tests
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed document texts. Output order matches input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a search query.
    ///
    /// Asymmetric models encode queries differently from documents; the
    /// default treats them the same.
    async fn embed_query(&self, query: &str) -> Result<Embedding> {
        let mut embeddings = self.embed(&[query.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| Error::embedding("Empty response for query embedding"))
    }

    /// Output dimensionality
    fn dimensions(&self) -> usize;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Scale a vector to unit length in place. Zero vectors are left alone.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Fail with `DimensionMismatch` unless every vector has `expected` entries
pub fn check_dimensions(embeddings: &[Embedding], expected: usize) -> Result<()> {
    match embeddings.iter().find(|e| e.len() != expected) {
        Some(bad) => Err(Error::DimensionMismatch {
            expected,
            actual: bad.len(),
        }),
        None => Ok(()),
    }
}
