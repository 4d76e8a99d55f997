//! Document and chunk types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Source metadata supplied with a document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Original filename as uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// When the source document was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Arbitrary key/value tags, usable as search filters
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A document handed over by the parsing collaborator.
///
/// The text is already extracted; the pipeline never persists it, only the
/// chunks derived from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Stable external ID
    pub id: String,
    /// Plain text content
    pub text: String,
    /// Source metadata
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document without metadata
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    /// Set the original filename
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.metadata.filename = Some(filename.into());
        self
    }

    /// Set the creation time
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.metadata.created_at = Some(created_at);
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.tags.insert(key.into(), value.into());
        self
    }
}

/// Identity of a chunk: `(document_id, chunk_index)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    /// Parent document ID
    pub document_id: String,
    /// Position of the chunk within the document
    pub chunk_index: u32,
}

impl ChunkKey {
    /// Create a new key
    pub fn new(document_id: impl Into<String>, chunk_index: u32) -> Self {
        Self {
            document_id: document_id.into(),
            chunk_index,
        }
    }

    /// Deterministic UUID for stores that only accept UUID point ids.
    ///
    /// The same key always maps to the same UUID, so writing it twice replaces
    /// the previous point.
    pub fn point_id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.to_string().as_bytes())
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document_id, self.chunk_index)
    }
}

/// A bounded span of a document's (normalized) text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Composite identity
    pub key: ChunkKey,
    /// Text of the span
    pub text: String,
    /// Byte offset of the span start
    pub char_start: usize,
    /// Byte offset of the span end (exclusive)
    pub char_end: usize,
    /// Leading bytes shared with the previous chunk
    pub overlap_len: usize,
    /// SHA-256 of `text`, hex encoded
    pub content_hash: String,
    /// Metadata inherited from the document
    pub metadata: DocumentMetadata,
}

impl Chunk {
    /// Parent document ID
    pub fn document_id(&self) -> &str {
        &self.key.document_id
    }

    /// Position within the document
    pub fn chunk_index(&self) -> u32 {
        self.key.chunk_index
    }

    /// The part of this chunk not shared with its predecessor
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap_len..]
    }
}

/// Hash chunk text for idempotent re-indexing
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_deterministic() {
        let a = ChunkKey::new("doc1", 0);
        let b = ChunkKey::new("doc1", 0);
        let c = ChunkKey::new("doc1", 1);
        assert_eq!(a.point_id(), b.point_id());
        assert_ne!(a.point_id(), c.point_id());
        assert_eq!(a.to_string(), "doc1:0");
    }

    #[test]
    fn test_content_hash() {
        let hash = content_hash("hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, content_hash("hello"));
        assert_ne!(hash, content_hash("hello "));
    }

    #[test]
    fn test_document_builder() {
        let doc = Document::new("d", "text")
            .with_filename("audit.docx")
            .with_tag("project", "alpha");
        assert_eq!(doc.metadata.filename.as_deref(), Some("audit.docx"));
        assert_eq!(doc.metadata.tags.get("project").map(String::as_str), Some("alpha"));
    }
}
