//! Document indexing: chunk, embed, then write all entries in one upsert

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::ingestion::TextChunker;
use crate::providers::embedding::check_dimensions;
use crate::providers::{Embedder, EntryManifest, IndexEntry, VectorIndexClient};
use crate::types::{
    Chunk, ChunkKey, DeleteReport, Document, Embedding, IndexOutcome, IndexReport,
};

use super::locks::DocumentLocks;
use super::retry::RetryPolicy;

/// Stages a document passes through while being indexed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexStage {
    Received,
    Chunked,
    Embedded,
    Upserted,
    Complete,
}

impl fmt::Display for IndexStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Chunked => "chunked",
            Self::Embedded => "embedded",
            Self::Upserted => "upserted",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Where an indexing run is: progressing through a stage, or failed in one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Running(IndexStage),
    Failed(IndexStage),
}

struct StageTracker<'a> {
    document_id: &'a str,
    state: IndexState,
}

impl<'a> StageTracker<'a> {
    fn new(document_id: &'a str) -> Self {
        Self {
            document_id,
            state: IndexState::Running(IndexStage::Received),
        }
    }

    fn advance(&mut self, next: IndexStage) {
        tracing::debug!("[{}] Stage {:?} -> {}", self.document_id, self.state, next);
        self.state = IndexState::Running(next);
    }

    /// Mark the run failed in its current stage and pass the error through
    fn fail(&mut self, error: Error) -> Error {
        if let IndexState::Running(stage) = self.state {
            self.state = IndexState::Failed(stage);
            tracing::error!(
                "[{}] Indexing failed at stage '{}': {}",
                self.document_id,
                stage,
                error
            );
        }
        error
    }
}

/// Indexing pipeline shared by all documents of a coordinator
pub struct IndexingPipeline {
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndexClient>,
    embed_permits: Arc<Semaphore>,
    embed_batch_size: usize,
    embed_timeout: Duration,
    retry: RetryPolicy,
    locks: DocumentLocks,
}

impl IndexingPipeline {
    /// Create a pipeline over the given backends
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndexClient>,
    ) -> Result<Self> {
        let max_in_flight = config.processing.max_in_flight_batches();
        tracing::info!(
            "Indexing pipeline configured: {} tokens per chunk, {} overlap, {} embedding batches in flight",
            config.chunking.max_tokens_per_chunk,
            config.chunking.overlap_tokens,
            max_in_flight
        );

        Ok(Self {
            chunker: TextChunker::from_config(&config.chunking)?,
            embedder,
            index,
            embed_permits: Arc::new(Semaphore::new(max_in_flight)),
            embed_batch_size: config.embeddings.batch_size.max(1),
            embed_timeout: config.embeddings.timeout(),
            retry: RetryPolicy::from_config(&config.retry),
            locks: DocumentLocks::new(),
        })
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Index a document.
    ///
    /// Unless `force` is set, a document whose stored chunks already match is
    /// left untouched.
    pub async fn index(&self, doc: &Document, force: bool) -> Result<IndexReport> {
        let started = Instant::now();
        let mut tracker = StageTracker::new(&doc.id);

        let guard = self.locks.acquire(&doc.id).await;

        let chunks = self.chunker.chunk(doc).map_err(|e| tracker.fail(e))?;
        tracker.advance(IndexStage::Chunked);

        let existing = self
            .retry
            .run("read manifest", || self.index.document_manifest(&doc.id))
            .await
            .map_err(|e| tracker.fail(e))?;

        if !force && manifest_matches(&existing, &chunks) {
            tracing::info!(
                "[{}] Unchanged ({} chunks), skipping embedding",
                doc.id,
                chunks.len()
            );
            return Ok(IndexReport {
                document_id: doc.id.clone(),
                outcome: IndexOutcome::Unchanged,
                chunk_count: chunks.len(),
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        // Embed before touching the store so a failing embedder keeps the old version
        let embeddings = self
            .embed_chunks(&doc.id, &chunks)
            .await
            .map_err(|e| tracker.fail(e))?;
        tracker.advance(IndexStage::Embedded);

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| IndexEntry::from_chunk(chunk, vector))
            .collect();

        // The write runs as its own task holding the document lock, so a caller
        // dropping this future cannot stop it between upsert requests
        let job = WriteJob {
            index: Arc::clone(&self.index),
            retry: self.retry.clone(),
            document_id: doc.id.clone(),
            entries,
            replace: !existing.is_empty(),
        };
        let removed = tokio::spawn(async move {
            let _guard = guard;
            job.run().await
        })
        .await
        .map_err(|e| Error::internal(format!("index write task failed: {}", e)))
        .and_then(|result| result)
        .map_err(|e| tracker.fail(e))?;
        tracker.advance(IndexStage::Upserted);

        let outcome = if existing.is_empty() {
            IndexOutcome::Indexed
        } else {
            IndexOutcome::Reindexed { removed }
        };
        tracker.advance(IndexStage::Complete);

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "[{}] Indexed {} chunks in {}ms ({:?})",
            doc.id,
            chunks.len(),
            duration_ms,
            outcome
        );

        Ok(IndexReport {
            document_id: doc.id.clone(),
            outcome,
            chunk_count: chunks.len(),
            duration_ms,
        })
    }

    /// Remove every entry of a document
    pub async fn delete(&self, document_id: &str) -> Result<DeleteReport> {
        if document_id.trim().is_empty() {
            return Err(Error::invalid_document(document_id, "document id is empty"));
        }

        let _guard = self.locks.acquire(document_id).await;
        let removed = self
            .retry
            .run("delete document", || self.index.delete_by_document(document_id))
            .await?;

        tracing::info!("[{}] Deleted {} entries", document_id, removed);
        Ok(DeleteReport {
            document_id: document_id.to_string(),
            removed,
        })
    }

    /// Embed all chunks, batches running concurrently under the global permit pool
    async fn embed_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<Vec<Embedding>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let batches: Vec<&[String]> = texts.chunks(self.embed_batch_size).collect();
        let batch_count = batches.len();

        let futures = batches.into_iter().enumerate().map(|(i, batch)| async move {
            let _permit = self
                .embed_permits
                .acquire()
                .await
                .map_err(|_| Error::internal("embedding semaphore closed"))?;

            tracing::debug!(
                "[{}] Embedding batch {}/{} ({} texts)",
                document_id,
                i + 1,
                batch_count,
                batch.len()
            );

            let vectors = self
                .retry
                .run("embed batch", || async {
                    match timeout(self.embed_timeout, self.embedder.embed(batch)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::embedding(format!(
                            "embedding timed out after {}s",
                            self.embed_timeout.as_secs()
                        ))),
                    }
                })
                .await?;

            if vectors.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            check_dimensions(&vectors, self.embedder.dimensions())?;
            Ok::<_, Error>(vectors)
        });

        let mut embeddings = Vec::with_capacity(chunks.len());
        for result in join_all(futures).await {
            embeddings.extend(result?);
        }
        Ok(embeddings)
    }
}

/// The store-mutating half of an indexing run: replace, upsert, roll back
struct WriteJob {
    index: Arc<dyn VectorIndexClient>,
    retry: RetryPolicy,
    document_id: String,
    entries: Vec<IndexEntry>,
    /// Delete the document's previous entries first
    replace: bool,
}

impl WriteJob {
    /// Returns the number of stale entries removed
    async fn run(self) -> Result<usize> {
        let removed = if self.replace {
            self.retry
                .run("delete stale entries", || {
                    self.index.delete_by_document(&self.document_id)
                })
                .await?
        } else {
            0
        };

        if let Err(e) = self.write_entries().await {
            self.rollback().await;
            return Err(e);
        }
        Ok(removed)
    }

    /// Upsert entries, resubmitting only the keys of a partial failure
    async fn write_entries(&self) -> Result<()> {
        let mut pending = self.entries.clone();
        let mut attempt = 1;

        loop {
            let error = match self.index.upsert(&pending).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if attempt >= self.retry.max_attempts() {
                return Err(error);
            }

            match error {
                Error::PartialUpsertFailure { failed_keys, message } => {
                    tracing::warn!(
                        "[{}] {} of {} entries not written, retrying them: {}",
                        self.document_id,
                        failed_keys.len(),
                        pending.len(),
                        message
                    );
                    let failed: HashSet<ChunkKey> = failed_keys.into_iter().collect();
                    pending.retain(|entry| failed.contains(&entry.key));
                }
                e if e.is_retryable() => {
                    tracing::warn!(
                        "[{}] Upsert failed (attempt {}/{}): {}",
                        self.document_id,
                        attempt,
                        self.retry.max_attempts(),
                        e
                    );
                }
                e => return Err(e),
            }

            sleep(self.retry.backoff(attempt - 1)).await;
            attempt += 1;
        }
    }

    /// Remove whatever part of a failed write reached the store
    async fn rollback(&self) {
        match self.index.delete_by_document(&self.document_id).await {
            Ok(removed) => tracing::warn!(
                "[{}] Rolled back {} partially written entries",
                self.document_id,
                removed
            ),
            Err(e) => tracing::error!("[{}] Rollback failed: {}", self.document_id, e),
        }
    }
}

/// True when the stored entries have exactly the new keys and content hashes
fn manifest_matches(existing: &[EntryManifest], chunks: &[Chunk]) -> bool {
    if existing.is_empty() || existing.len() != chunks.len() {
        return false;
    }

    let mut stored: Vec<(&ChunkKey, &str)> = existing
        .iter()
        .map(|m| (&m.key, m.content_hash.as_str()))
        .collect();
    stored.sort();

    let mut fresh: Vec<(&ChunkKey, &str)> = chunks
        .iter()
        .map(|c| (&c.key, c.content_hash.as_str()))
        .collect();
    fresh.sort();

    stored == fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentMetadata;

    fn chunk(doc: &str, index: u32, hash: &str) -> Chunk {
        Chunk {
            key: ChunkKey::new(doc, index),
            text: String::new(),
            char_start: 0,
            char_end: 0,
            overlap_len: 0,
            content_hash: hash.to_string(),
            metadata: DocumentMetadata::default(),
        }
    }

    fn manifest(doc: &str, index: u32, hash: &str) -> EntryManifest {
        EntryManifest {
            key: ChunkKey::new(doc, index),
            content_hash: hash.to_string(),
        }
    }

    #[test]
    fn test_manifest_matches() {
        let chunks = vec![chunk("d", 0, "h0"), chunk("d", 1, "h1")];

        assert!(manifest_matches(
            &[manifest("d", 1, "h1"), manifest("d", 0, "h0")],
            &chunks
        ));
        assert!(!manifest_matches(&[], &chunks));
        assert!(!manifest_matches(&[manifest("d", 0, "h0")], &chunks));
        assert!(!manifest_matches(
            &[manifest("d", 0, "h0"), manifest("d", 1, "changed")],
            &chunks
        ));
    }

    #[test]
    fn test_stage_tracker_records_failure_stage() {
        let mut tracker = StageTracker::new("d");
        tracker.advance(IndexStage::Chunked);
        let error = tracker.fail(Error::embedding("down"));

        assert!(matches!(error, Error::EmbeddingUnavailable(_)));
        assert_eq!(tracker.state, IndexState::Failed(IndexStage::Chunked));

        // A second failure keeps the first recorded stage
        tracker.fail(Error::index("down"));
        assert_eq!(tracker.state, IndexState::Failed(IndexStage::Chunked));
    }
}
