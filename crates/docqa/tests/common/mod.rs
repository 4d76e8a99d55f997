//! Shared fixtures: test configuration and scripted backends

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docqa::config::{EmbeddingBackend, RetryConfig, VectorBackend};
use docqa::providers::{
    DistanceMetric, Embedder, EntryManifest, HashEmbedder, InMemoryVectorIndex, IndexEntry,
    ScoredEntry, VectorIndexClient,
};
use docqa::types::Embedding;
use docqa::{Error, PipelineCoordinator, RagConfig, Result, SearchFilter};

pub const DIMENSIONS: usize = 256;

/// Small chunks, in-memory backends and millisecond backoff
pub fn test_config() -> RagConfig {
    let mut config = RagConfig::default();
    config.embeddings.backend = EmbeddingBackend::Hash;
    config.embeddings.dimensions = DIMENSIONS;
    config.embeddings.batch_size = 2;
    config.chunking.max_tokens_per_chunk = 8;
    config.chunking.overlap_tokens = 0;
    config.vector_db.backend = VectorBackend::Memory;
    config.retry = RetryConfig {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        multiplier: 2.0,
    };
    config
}

/// `n` sentences of seven tokens each; each becomes its own chunk under
/// `test_config`
pub fn sentences(n: usize) -> String {
    (0..n)
        .map(|i| format!("Sentence {} mentions topic{} alpha beta.", i, i))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hash embedder that counts calls and can be scripted to fail or stall
pub struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
    fail_on: Option<String>,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: HashEmbedder::new(dimensions),
            calls: AtomicUsize::new(0),
            fail_on: None,
            failures_left: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Fail the first `failures` calls, then behave
    pub fn flaky(dimensions: usize, failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            ..Self::new(dimensions)
        }
    }

    /// Sleep for `delay` before every answer
    pub fn slow(dimensions: usize, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(dimensions)
        }
    }

    /// Fail every batch containing a text with `marker`
    pub fn failing_on(dimensions: usize, marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
            ..Self::new(dimensions)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn stall_or_fail(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::embedding("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.stall_or_fail().await?;
        if let Some(marker) = &self.fail_on {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(Error::embedding("model crashed"));
            }
        }
        self.inner.embed(texts).await
    }

    async fn embed_query(&self, query: &str) -> Result<Embedding> {
        self.stall_or_fail().await?;
        Ok(self.inner.embed_text(query))
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// How `FlakyIndex` treats upserts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    Healthy,
    /// First upsert drops its last entry, later ones succeed
    DropLastOnce,
    /// Every upsert drops its last entry
    AlwaysDropLast,
}

/// In-memory index that records calls and injects partial upsert failures
pub struct FlakyIndex {
    pub inner: InMemoryVectorIndex,
    mode: Mutex<UpsertMode>,
    upsert_sizes: Mutex<Vec<usize>>,
    ensure_calls: AtomicUsize,
}

impl FlakyIndex {
    pub fn new(mode: UpsertMode) -> Self {
        Self {
            inner: InMemoryVectorIndex::new("test"),
            mode: Mutex::new(mode),
            upsert_sizes: Mutex::new(Vec::new()),
            ensure_calls: AtomicUsize::new(0),
        }
    }

    pub fn upsert_sizes(&self) -> Vec<usize> {
        self.upsert_sizes.lock().clone()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndexClient for FlakyIndex {
    async fn ensure_collection(&self, dimension: usize, metric: DistanceMetric) -> Result<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.ensure_collection(dimension, metric).await
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        self.upsert_sizes.lock().push(entries.len());

        let mode = {
            let mut mode = self.mode.lock();
            let current = *mode;
            if current == UpsertMode::DropLastOnce {
                *mode = UpsertMode::Healthy;
            }
            current
        };

        match (mode, entries.split_last()) {
            (UpsertMode::Healthy, _) | (_, None) => self.inner.upsert(entries).await,
            (_, Some((last, rest))) => {
                self.inner.upsert(rest).await?;
                Err(Error::PartialUpsertFailure {
                    failed_keys: vec![last.key.clone()],
                    message: "shard unavailable".to_string(),
                })
            }
        }
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        self.inner.delete_by_document(document_id).await
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredEntry>> {
        self.inner.search(query, top_k, filter).await
    }

    async fn document_manifest(&self, document_id: &str) -> Result<Vec<EntryManifest>> {
        self.inner.document_manifest(document_id).await
    }

    async fn count(&self, filter: &SearchFilter) -> Result<usize> {
        self.inner.count(filter).await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// In-memory index that writes one entry per request, pausing between them
pub struct SlowIndex {
    pub inner: InMemoryVectorIndex,
    delay: Duration,
}

impl SlowIndex {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryVectorIndex::new("test"),
            delay,
        }
    }
}

#[async_trait]
impl VectorIndexClient for SlowIndex {
    async fn ensure_collection(&self, dimension: usize, metric: DistanceMetric) -> Result<()> {
        self.inner.ensure_collection(dimension, metric).await
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.upsert(std::slice::from_ref(entry)).await?;
        }
        Ok(())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        self.inner.delete_by_document(document_id).await
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredEntry>> {
        self.inner.search(query, top_k, filter).await
    }

    async fn document_manifest(&self, document_id: &str) -> Result<Vec<EntryManifest>> {
        self.inner.document_manifest(document_id).await
    }

    async fn count(&self, filter: &SearchFilter) -> Result<usize> {
        self.inner.count(filter).await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Coordinator over a counting embedder and a plain in-memory index
pub async fn memory_coordinator(
    config: RagConfig,
) -> (PipelineCoordinator, Arc<CountingEmbedder>, Arc<InMemoryVectorIndex>) {
    let embedder = Arc::new(CountingEmbedder::new(config.embeddings.dimensions));
    let index = Arc::new(InMemoryVectorIndex::new("test"));
    let coordinator = PipelineCoordinator::connect(config, embedder.clone(), index.clone())
        .await
        .expect("coordinator connects");
    (coordinator, embedder, index)
}
