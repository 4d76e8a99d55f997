//! Query embedding, oversampled vector search and deduplication

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::{RagConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::processing::RetryPolicy;
use crate::providers::embedding::check_dimensions;
use crate::providers::{Embedder, ScoredEntry, VectorIndexClient};
use crate::types::{QueryOptions, RetrievalResult, RetrievedPassage};

/// How candidates are collapsed before truncation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupPolicy {
    /// Passages kept per document (0 = unlimited)
    pub max_passages_per_document: usize,
    /// Keep only the best passage among identical texts
    pub dedup_identical_content: bool,
    /// Drop candidates scoring below this value
    pub min_score: Option<f32>,
}

/// Retrieval pipeline: embed the question, search, rank and deduplicate
pub struct RetrievalPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndexClient>,
    config: RetrievalConfig,
    embed_timeout: Duration,
    retry: RetryPolicy,
}

impl RetrievalPipeline {
    /// Create a pipeline over the given backends
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndexClient>,
    ) -> Self {
        Self {
            embedder,
            index,
            config: config.retrieval.clone(),
            embed_timeout: config.embeddings.timeout(),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Retrieve the passages most relevant to `query`
    pub async fn retrieve(&self, query: &str, options: &QueryOptions) -> Result<RetrievalResult> {
        if query.trim().is_empty() {
            return Err(Error::InvalidQuery("query text is empty".to_string()));
        }

        let top_k = options.top_k.unwrap_or(self.config.default_top_k);
        if top_k == 0 {
            return Ok(RetrievalResult {
                query: query.to_string(),
                ..RetrievalResult::default()
            });
        }

        let query_vector = self
            .retry
            .run("embed query", || async {
                match timeout(self.embed_timeout, self.embedder.embed_query(query)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::embedding(format!(
                        "query embedding timed out after {}s",
                        self.embed_timeout.as_secs()
                    ))),
                }
            })
            .await?;
        check_dimensions(std::slice::from_ref(&query_vector), self.embedder.dimensions())?;

        let fetch = top_k.saturating_mul(self.config.oversample_factor.max(1));
        let candidates = self
            .retry
            .run("search", || {
                self.index.search(&query_vector, fetch, &options.filter)
            })
            .await?;
        let candidates_considered = candidates.len();

        let policy = DedupPolicy {
            max_passages_per_document: options
                .max_passages_per_document
                .unwrap_or(self.config.max_passages_per_document),
            dedup_identical_content: self.config.dedup_identical_content,
            min_score: options.min_score.or(self.config.min_score),
        };
        let passages = select_passages(candidates, top_k, &policy);

        tracing::info!(
            "Retrieved {} passages from {} candidates (top_k {})",
            passages.len(),
            candidates_considered,
            top_k
        );

        Ok(RetrievalResult {
            query: query.to_string(),
            passages,
            candidates_considered,
        })
    }
}

/// Order candidates, apply the dedup policy and keep at most `top_k`.
///
/// Ordering is by descending score with ties broken by chunk key, so equal
/// inputs always produce equal output.
pub fn select_passages(
    mut candidates: Vec<ScoredEntry>,
    top_k: usize,
    policy: &DedupPolicy,
) -> Vec<RetrievedPassage> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });

    let mut per_document: HashMap<String, usize> = HashMap::new();
    let mut seen_content: HashSet<String> = HashSet::new();
    let mut passages = Vec::with_capacity(top_k);

    for candidate in candidates {
        if passages.len() >= top_k {
            break;
        }
        if let Some(min) = policy.min_score {
            if candidate.score < min {
                continue;
            }
        }

        let taken = per_document
            .get(&candidate.key.document_id)
            .copied()
            .unwrap_or(0);
        if policy.max_passages_per_document > 0 && taken >= policy.max_passages_per_document {
            continue;
        }
        if policy.dedup_identical_content
            && !seen_content.insert(candidate.payload.content_hash.clone())
        {
            continue;
        }

        *per_document
            .entry(candidate.key.document_id.clone())
            .or_insert(0) += 1;
        passages.push(candidate.into_passage());
    }

    passages
}
