//! Pipeline coordinator: the operations exposed to the API layer

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::{EmbeddingBackend, RagConfig, VectorBackend};
use crate::error::{Error, Result};
use crate::processing::{IndexingPipeline, RetryPolicy};
use crate::providers::{
    Embedder, HashEmbedder, InMemoryVectorIndex, OllamaEmbedder, QdrantIndex, VectorIndexClient,
};
use crate::retrieval::RetrievalPipeline;
use crate::types::{
    DeleteReport, Document, IndexReport, QueryOptions, RetrievalResult, SearchFilter,
};

/// Reachability of the backing services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub embedder: String,
    pub embedder_healthy: bool,
    pub index: String,
    pub index_healthy: bool,
}

impl HealthStatus {
    /// True when both services respond
    pub fn is_healthy(&self) -> bool {
        self.embedder_healthy && self.index_healthy
    }
}

/// Entry point for indexing, deletion and retrieval.
///
/// Owns nothing but configuration, the shared clients and the per-document
/// lock table inside the indexing pipeline.
pub struct PipelineCoordinator {
    config: RagConfig,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndexClient>,
    indexing: IndexingPipeline,
    retrieval: RetrievalPipeline,
    document_permits: Arc<Semaphore>,
}

impl std::fmt::Debug for PipelineCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineCoordinator {
    /// Build a coordinator over existing backends.
    ///
    /// Fails with `DimensionMismatch` when the embedder output size differs
    /// from the configuration or from an existing collection.
    pub async fn connect(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndexClient>,
    ) -> Result<Self> {
        config.validate()?;

        let dimensions = config.embeddings.dimensions;
        if embedder.dimensions() != dimensions {
            return Err(Error::DimensionMismatch {
                expected: dimensions,
                actual: embedder.dimensions(),
            });
        }

        let retry = RetryPolicy::from_config(&config.retry);
        retry
            .run("ensure collection", || {
                index.ensure_collection(dimensions, config.vector_db.distance)
            })
            .await?;

        let indexing = IndexingPipeline::new(&config, Arc::clone(&embedder), Arc::clone(&index))?;
        let retrieval = RetrievalPipeline::new(&config, Arc::clone(&embedder), Arc::clone(&index));
        let document_permits = Arc::new(Semaphore::new(config.processing.parallel_documents()));

        tracing::info!(
            "Coordinator ready: embedder '{}' ({} dims), index '{}' collection '{}'",
            embedder.name(),
            dimensions,
            index.name(),
            config.vector_db.collection
        );

        Ok(Self {
            config,
            embedder,
            index,
            indexing,
            retrieval,
            document_permits,
        })
    }

    /// Build the backends named in the configuration, then connect
    pub async fn from_config(config: RagConfig) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = match config.embeddings.backend {
            EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(&config.embeddings)?),
            EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(config.embeddings.dimensions)),
        };

        let index: Arc<dyn VectorIndexClient> = match config.vector_db.backend {
            VectorBackend::Qdrant => Arc::new(QdrantIndex::new(&config.vector_db)?),
            VectorBackend::Memory => Arc::new(InMemoryVectorIndex::new(&config.vector_db.collection)),
        };

        Self::connect(config, embedder, index).await
    }

    /// Active configuration
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Index a document, skipping it when its stored chunks already match
    pub async fn index_document(&self, doc: &Document) -> Result<IndexReport> {
        self.indexing.index(doc, false).await
    }

    /// Index a document, re-embedding even when unchanged
    pub async fn reindex_document(&self, doc: &Document) -> Result<IndexReport> {
        self.indexing.index(doc, true).await
    }

    /// Remove all entries of a document
    pub async fn delete_document(&self, document_id: &str) -> Result<DeleteReport> {
        self.indexing.delete(document_id).await
    }

    /// Retrieve passages for a question
    pub async fn query(&self, text: &str, options: QueryOptions) -> Result<RetrievalResult> {
        self.retrieval.retrieve(text, &options).await
    }

    /// Index many documents with bounded concurrency.
    ///
    /// Results come back in input order; one failure does not stop the rest.
    pub async fn index_documents(&self, docs: Vec<Document>) -> Vec<Result<IndexReport>> {
        let total = docs.len();
        tracing::info!(
            "Indexing {} documents ({} in parallel)",
            total,
            self.config.processing.parallel_documents()
        );

        let futures = docs.into_iter().map(|doc| {
            let permits = Arc::clone(&self.document_permits);
            async move {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|_| Error::internal("document semaphore closed"))?;
                self.index_document(&doc).await
            }
        });

        let results = join_all(futures).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!("{} of {} documents failed to index", failed, total);
        }
        results
    }

    /// Whether any entry of the document is stored
    pub async fn is_indexed(&self, document_id: &str) -> Result<bool> {
        let count = self
            .index
            .count(&SearchFilter::documents([document_id]))
            .await?;
        Ok(count > 0)
    }

    /// `is_indexed` for several documents at once
    pub async fn are_indexed(&self, document_ids: &[String]) -> Result<BTreeMap<String, bool>> {
        let mut indexed = BTreeMap::new();
        for id in document_ids {
            indexed.insert(id.clone(), self.is_indexed(id).await?);
        }
        Ok(indexed)
    }

    /// Check both backing services
    pub async fn health_check(&self) -> HealthStatus {
        let (embedder_healthy, index_healthy) =
            tokio::join!(self.embedder.health_check(), self.index.health_check());

        HealthStatus {
            embedder: self.embedder.name().to_string(),
            embedder_healthy: embedder_healthy.unwrap_or(false),
            index: self.index.name().to_string(),
            index_healthy: index_healthy.unwrap_or(false),
        }
    }
}
