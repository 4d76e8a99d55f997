//! Configuration for the indexing and retrieval core
//!
//! Loaded once at startup (TOML file plus `DOCQA_*` environment overrides),
//! validated, then handed to the coordinator. Nothing reloads it afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ingestion::SplitBoundary;
use crate::providers::DistanceMetric;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Embedding service configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Vector database configuration
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Processing (concurrency) configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Retry configuration for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl RagConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::config(format!("Invalid TOML: {}", e)))
    }

    /// Read configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    /// Load configuration: file (if given) or defaults, then environment
    /// overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DOCQA_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("DOCQA_EMBEDDING_URL") {
            self.embeddings.base_url = url;
        }
        if let Some(model) = lookup("DOCQA_EMBEDDING_MODEL") {
            self.embeddings.model = model;
        }
        if let Some(dims) = lookup("DOCQA_EMBEDDING_DIMENSIONS") {
            self.embeddings.dimensions = dims.trim().parse().map_err(|e| {
                Error::config(format!("DOCQA_EMBEDDING_DIMENSIONS='{}': {}", dims, e))
            })?;
        }
        if let Some(url) = lookup("DOCQA_VECTOR_DB_URL") {
            self.vector_db.url = url;
        }
        if let Some(key) = lookup("DOCQA_VECTOR_DB_API_KEY") {
            self.vector_db.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(collection) = lookup("DOCQA_COLLECTION") {
            self.vector_db.collection = collection;
        }
        Ok(())
    }

    /// Check that all values are usable together
    pub fn validate(&self) -> Result<()> {
        if self.embeddings.dimensions == 0 {
            return Err(Error::config("embeddings.dimensions must be greater than zero"));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::config("embeddings.batch_size must be greater than zero"));
        }
        if self.embeddings.timeout_secs == 0 {
            return Err(Error::config("embeddings.timeout_secs must be greater than zero"));
        }
        if self.chunking.max_tokens_per_chunk == 0 {
            return Err(Error::config("chunking.max_tokens_per_chunk must be greater than zero"));
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens_per_chunk {
            return Err(Error::config(format!(
                "chunking.overlap_tokens ({}) must be less than max_tokens_per_chunk ({})",
                self.chunking.overlap_tokens, self.chunking.max_tokens_per_chunk
            )));
        }
        if self.vector_db.collection.trim().is_empty() {
            return Err(Error::config("vector_db.collection must not be empty"));
        }
        if self.vector_db.upsert_batch_size == 0 {
            return Err(Error::config("vector_db.upsert_batch_size must be greater than zero"));
        }
        if self.vector_db.timeout_secs == 0 {
            return Err(Error::config("vector_db.timeout_secs must be greater than zero"));
        }
        if self.retrieval.oversample_factor == 0 {
            return Err(Error::config("retrieval.oversample_factor must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(Error::config("retry.multiplier must be >= 1.0"));
        }
        Ok(())
    }
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama-compatible HTTP embedding service
    #[default]
    Ollama,
    /// Offline feature-hashing embedder (development and tests)
    Hash,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which embedder to construct
    pub backend: EmbeddingBackend,
    /// Embedding service base URL
    pub base_url: String,
    /// Model to use
    pub model: String,
    /// Embedding dimensions; must match the model's output
    pub dimensions: usize,
    /// Texts per embedding request
    pub batch_size: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Prefix prepended to document texts (asymmetric models)
    pub document_prefix: String,
    /// Prefix prepended to query texts (asymmetric models)
    pub query_prefix: String,
    /// L2-normalize returned vectors
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            batch_size: 32,
            timeout_secs: 60,
            document_prefix: "search_document: ".to_string(),
            query_prefix: "search_query: ".to_string(),
            normalize: true,
        }
    }
}

impl EmbeddingConfig {
    /// Timeout for a single embedding call
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum tokens in one chunk
    pub max_tokens_per_chunk: usize,
    /// Tokens shared between adjacent chunks
    pub overlap_tokens: usize,
    /// Preferred split boundary
    pub split_boundary: SplitBoundary,
    /// Collapse redundant whitespace before chunking
    pub normalize_whitespace: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: 100,
            overlap_tokens: 10,
            split_boundary: SplitBoundary::Sentence,
            normalize_whitespace: true,
        }
    }
}

/// Vector store backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Qdrant over its REST API
    #[default]
    Qdrant,
    /// Process-local exact index
    Memory,
}

/// Vector database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Which vector store to use
    pub backend: VectorBackend,
    /// Vector store endpoint
    pub url: String,
    /// API key sent with every request
    pub api_key: Option<String>,
    /// Collection name
    pub collection: String,
    /// Similarity metric for the collection
    pub distance: DistanceMetric,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Entries per upsert request
    pub upsert_batch_size: usize,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Qdrant,
            url: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "docqa".to_string(),
            distance: DistanceMetric::Cosine,
            timeout_secs: 30,
            upsert_batch_size: 256,
        }
    }
}

impl VectorDbConfig {
    /// Timeout for a single vector store call
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// `top_k` when the caller does not pass one
    pub default_top_k: usize,
    /// Candidates fetched per requested result, to survive deduplication
    pub oversample_factor: usize,
    /// Passages kept per document (0 = unlimited)
    pub max_passages_per_document: usize,
    /// Collapse passages with identical text across documents
    pub dedup_identical_content: bool,
    /// Drop candidates scoring below this value
    pub min_score: Option<f32>,
    /// Character budget for a rendered context
    pub context_max_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 3,
            oversample_factor: 4,
            max_passages_per_document: 1,
            dedup_identical_content: true,
            min_score: None,
            context_max_chars: 8000,
        }
    }
}

/// Processing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Documents indexed concurrently (default: CPU count, max 8)
    pub parallel_documents: Option<usize>,
    /// Embedding batches in flight across all documents (default: CPU count, max 4)
    pub max_in_flight_batches: Option<usize>,
}

impl ProcessingConfig {
    /// Resolved document concurrency
    pub fn parallel_documents(&self) -> usize {
        self.parallel_documents
            .unwrap_or_else(|| num_cpus::get().min(8))
            .max(1)
    }

    /// Resolved embedding batch concurrency
    pub fn max_in_flight_batches(&self) -> usize {
        self.max_in_flight_batches
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }
}

/// Bounded exponential backoff for transient failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_backoff_ms: u64,
    /// Growth factor between delays
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            multiplier: 2.0,
        }
    }
}
