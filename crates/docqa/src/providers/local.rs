//! Local provider implementations that need no external service
//!
//! `InMemoryVectorIndex` keeps entries in process memory and searches them
//! exactly. `HashEmbedder` derives vectors from hashed words. Both are used
//! for local runs and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};
use crate::types::{ChunkKey, Embedding, SearchFilter};

use super::embedding::{l2_normalize, Embedder};
use super::vector_store::{
    DistanceMetric, EntryManifest, EntryPayload, IndexEntry, ScoredEntry, VectorIndexClient,
};

struct Collection {
    dimension: usize,
    metric: DistanceMetric,
    entries: BTreeMap<ChunkKey, (Embedding, EntryPayload)>,
}

/// Exact in-memory vector index
pub struct InMemoryVectorIndex {
    name: String,
    collection: RwLock<Option<Collection>>,
}

impl InMemoryVectorIndex {
    /// Create an index for the named collection
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: RwLock::new(None),
        }
    }

    /// Collection name
    pub fn collection_name(&self) -> &str {
        &self.name
    }

    /// Total number of stored entries
    pub fn len(&self) -> usize {
        self.collection
            .read()
            .as_ref()
            .map(|c| c.entries.len())
            .unwrap_or(0)
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored keys, in key order
    pub fn keys(&self) -> Vec<ChunkKey> {
        self.collection
            .read()
            .as_ref()
            .map(|c| c.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn missing_collection(&self) -> Error {
        Error::config(format!(
            "collection '{}' does not exist; call ensure_collection first",
            self.name
        ))
    }
}

#[async_trait]
impl VectorIndexClient for InMemoryVectorIndex {
    async fn ensure_collection(&self, dimension: usize, metric: DistanceMetric) -> Result<()> {
        let mut guard = self.collection.write();
        match guard.as_ref() {
            Some(existing) if existing.dimension != dimension => Err(Error::DimensionMismatch {
                expected: existing.dimension,
                actual: dimension,
            }),
            Some(existing) if existing.metric != metric => Err(Error::config(format!(
                "collection '{}' uses {:?} distance, configured {:?}",
                self.name, existing.metric, metric
            ))),
            Some(_) => Ok(()),
            None => {
                *guard = Some(Collection {
                    dimension,
                    metric,
                    entries: BTreeMap::new(),
                });
                tracing::info!("Created in-memory collection '{}' ({} dims)", self.name, dimension);
                Ok(())
            }
        }
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut guard = self.collection.write();
        let collection = guard.as_mut().ok_or_else(|| self.missing_collection())?;

        let mut failed_keys = Vec::new();
        for entry in entries {
            if entry.vector.len() != collection.dimension {
                failed_keys.push(entry.key.clone());
                continue;
            }
            collection
                .entries
                .insert(entry.key.clone(), (entry.vector.clone(), entry.payload.clone()));
        }

        if failed_keys.is_empty() {
            Ok(())
        } else {
            Err(Error::PartialUpsertFailure {
                message: format!(
                    "vectors must have {} dimensions",
                    collection.dimension
                ),
                failed_keys,
            })
        }
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        let mut guard = self.collection.write();
        let Some(collection) = guard.as_mut() else {
            return Ok(0);
        };

        let before = collection.entries.len();
        collection
            .entries
            .retain(|key, _| key.document_id != document_id);
        Ok(before - collection.entries.len())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredEntry>> {
        let guard = self.collection.read();
        let collection = guard.as_ref().ok_or_else(|| self.missing_collection())?;

        if query.len() != collection.dimension {
            return Err(Error::DimensionMismatch {
                expected: collection.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<ScoredEntry> = collection
            .entries
            .iter()
            .filter(|(key, (_, payload))| filter.matches(&key.document_id, &payload.tags))
            .map(|(key, (vector, payload))| ScoredEntry {
                key: key.clone(),
                payload: payload.clone(),
                score: collection.metric.score(query, vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn document_manifest(&self, document_id: &str) -> Result<Vec<EntryManifest>> {
        let guard = self.collection.read();
        let Some(collection) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        Ok(collection
            .entries
            .iter()
            .filter(|(key, _)| key.document_id == document_id)
            .map(|(key, (_, payload))| EntryManifest {
                key: key.clone(),
                content_hash: payload.content_hash.clone(),
            })
            .collect())
    }

    async fn count(&self, filter: &SearchFilter) -> Result<usize> {
        let guard = self.collection.read();
        Ok(guard
            .as_ref()
            .map(|c| {
                c.entries
                    .iter()
                    .filter(|(key, (_, payload))| filter.matches(&key.document_id, &payload.tags))
                    .count()
            })
            .unwrap_or(0))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Deterministic embedder based on signed feature hashing of lowercase words.
///
/// Texts sharing words get similar vectors, which is enough for local runs
/// and tests; it carries no semantics beyond word overlap.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Create an embedder producing `dimensions`-sized vectors
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Embed one text synchronously
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }

        for word in text.unicode_words() {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, DocumentMetadata};

    fn entry(doc: &str, index: u32, vector: Vec<f32>) -> IndexEntry {
        let chunk = Chunk {
            key: ChunkKey::new(doc, index),
            text: format!("{} chunk {}", doc, index),
            char_start: 0,
            char_end: 0,
            overlap_len: 0,
            content_hash: format!("hash-{}-{}", doc, index),
            metadata: DocumentMetadata::default(),
        };
        IndexEntry::from_chunk(&chunk, vector)
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_key() {
        let index = InMemoryVectorIndex::new("test");
        index.ensure_collection(2, DistanceMetric::Cosine).await.unwrap();

        index.upsert(&[entry("a", 0, vec![1.0, 0.0])]).await.unwrap();
        index.upsert(&[entry("a", 0, vec![0.0, 1.0])]).await.unwrap();

        assert_eq!(index.len(), 1);
        let hits = index.search(&[0.0, 1.0], 5, &SearchFilter::none()).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_ensure_collection_dimension_mismatch() {
        let index = InMemoryVectorIndex::new("test");
        index.ensure_collection(4, DistanceMetric::Cosine).await.unwrap();
        index.ensure_collection(4, DistanceMetric::Cosine).await.unwrap();

        let err = index.ensure_collection(8, DistanceMetric::Cosine).await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 8 }));
    }

    #[tokio::test]
    async fn test_ensure_collection_metric_mismatch() {
        let index = InMemoryVectorIndex::new("test");
        index.ensure_collection(4, DistanceMetric::Cosine).await.unwrap();

        let err = index.ensure_collection(4, DistanceMetric::Dot).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_partial_upsert_reports_failed_keys() {
        let index = InMemoryVectorIndex::new("test");
        index.ensure_collection(2, DistanceMetric::Cosine).await.unwrap();

        let err = index
            .upsert(&[entry("a", 0, vec![1.0, 0.0]), entry("a", 1, vec![1.0])])
            .await
            .unwrap_err();

        match err {
            Error::PartialUpsertFailure { failed_keys, .. } => {
                assert_eq!(failed_keys, vec![ChunkKey::new("a", 1)]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(index.keys(), vec![ChunkKey::new("a", 0)]);
    }

    #[tokio::test]
    async fn test_search_filter_and_order() {
        let index = InMemoryVectorIndex::new("test");
        index.ensure_collection(2, DistanceMetric::Cosine).await.unwrap();
        index
            .upsert(&[
                entry("a", 0, vec![1.0, 0.0]),
                entry("a", 1, vec![0.7, 0.7]),
                entry("b", 0, vec![0.9, 0.1]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 10, &SearchFilter::none()).await.unwrap();
        let keys: Vec<String> = hits.iter().map(|h| h.key.to_string()).collect();
        assert_eq!(keys, vec!["a:0", "b:0", "a:1"]);

        let hits = index
            .search(&[1.0, 0.0], 10, &SearchFilter::documents(["a"]))
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.key.document_id == "a"));
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_and_manifest() {
        let index = InMemoryVectorIndex::new("test");
        index.ensure_collection(2, DistanceMetric::Dot).await.unwrap();
        index
            .upsert(&[entry("a", 0, vec![1.0, 0.0]), entry("a", 1, vec![0.0, 1.0]), entry("b", 0, vec![1.0, 1.0])])
            .await
            .unwrap();

        let manifest = index.document_manifest("a").await.unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[1].content_hash, "hash-a-1");

        assert_eq!(index.delete_by_document("a").await.unwrap(), 2);
        assert_eq!(index.delete_by_document("a").await.unwrap(), 0);
        assert_eq!(index.delete_by_document("unknown").await.unwrap(), 0);
        assert_eq!(index.count(&SearchFilter::none()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let texts = vec![
            "Quarterly revenue grew".to_string(),
            "quarterly REVENUE grew".to_string(),
            "The cat sat on the mat".to_string(),
        ];

        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 64));
        assert_eq!(vectors[0], vectors[1]);

        let same = DistanceMetric::Cosine.score(&vectors[0], &vectors[1]);
        let different = DistanceMetric::Cosine.score(&vectors[0], &vectors[2]);
        assert!(same > different);
    }
}
