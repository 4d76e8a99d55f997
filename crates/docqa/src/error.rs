//! Error types for the indexing and retrieval core

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ChunkKey;

/// Result type alias for docqa operations
pub type Result<T> = std::result::Result<T, Error>;

/// docqa errors
#[derive(Debug, Error)]
pub enum Error {
    /// Document is empty or otherwise unusable; the caller must fix the input
    #[error("Invalid document '{document_id}': {message}")]
    InvalidDocument { document_id: String, message: String },

    /// Query text cannot be searched
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Embedding service unreachable, failing or too slow
    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Vector store unreachable, failing or too slow
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// Vector dimensionality disagrees with the configured collection
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Some entries of an upsert batch were not written
    #[error("Upsert failed for {} of the submitted entries: {message}", failed_keys.len())]
    PartialUpsertFailure {
        failed_keys: Vec<ChunkKey>,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, serializable classification of an [`Error`] for callers that map
/// failures onto their own responses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidDocument,
    InvalidQuery,
    EmbeddingUnavailable,
    IndexUnavailable,
    DimensionMismatch,
    PartialUpsertFailure,
    Config,
    Internal,
}

impl ErrorKind {
    /// Distinct HTTP status for each kind
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidDocument | Self::InvalidQuery => 400,
            Self::EmbeddingUnavailable | Self::IndexUnavailable => 503,
            Self::PartialUpsertFailure => 502,
            Self::DimensionMismatch | Self::Config | Self::Internal => 500,
        }
    }

    /// Snake-case tag, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidDocument => "invalid_document",
            Self::InvalidQuery => "invalid_query",
            Self::EmbeddingUnavailable => "embedding_unavailable",
            Self::IndexUnavailable => "index_unavailable",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::PartialUpsertFailure => "partial_upsert_failure",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl Error {
    /// Create an invalid document error
    pub fn invalid_document(document_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            document_id: document_id.into(),
            message: message.into(),
        }
    }

    /// Create an embedding-unavailable error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable(message.into())
    }

    /// Create an index-unavailable error
    pub fn index(message: impl Into<String>) -> Self {
        Self::IndexUnavailable(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDocument { .. } => ErrorKind::InvalidDocument,
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::EmbeddingUnavailable(_) => ErrorKind::EmbeddingUnavailable,
            Self::IndexUnavailable(_) => ErrorKind::IndexUnavailable,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::PartialUpsertFailure { .. } => ErrorKind::PartialUpsertFailure,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) | Self::Json(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// `PartialUpsertFailure` is not retryable as a whole; only its
    /// `failed_keys` should be resubmitted.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable(_) | Self::IndexUnavailable(_)
        )
    }

    /// JSON body for API layers: `{"error": {"type", "message"}}`
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": {
                "type": self.kind().as_str(),
                "message": self.to_string(),
            }
        });
        if let Self::PartialUpsertFailure { failed_keys, .. } = self {
            body["error"]["failed_keys"] = serde_json::json!(failed_keys);
        }
        body
    }
}
