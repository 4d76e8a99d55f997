//! Results returned by the coordinator operations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::document::ChunkKey;

/// One retrieved passage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedPassage {
    /// Chunk identity
    pub key: ChunkKey,
    /// Chunk text
    pub text: String,
    /// Similarity score reported by the index (higher is better)
    pub score: f32,
    /// Original filename, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Document tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Hash of `text`
    pub content_hash: String,
    /// Byte range in the normalized document text
    pub char_start: usize,
    pub char_end: usize,
}

impl RetrievedPassage {
    /// Parent document ID
    pub fn document_id(&self) -> &str {
        &self.key.document_id
    }

    /// Format the source for display
    pub fn source_ref(&self) -> String {
        let mut parts = Vec::new();
        if let Some(filename) = &self.filename {
            parts.push(filename.clone());
        }
        parts.push(format!("document {}", self.key.document_id));
        parts.push(format!("chunk {}", self.key.chunk_index));
        parts.join(", ")
    }
}

/// Ranked, deduplicated passages for one query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The query text as received
    pub query: String,
    /// Passages, highest score first
    pub passages: Vec<RetrievedPassage>,
    /// Candidates fetched from the index before deduplication
    pub candidates_considered: usize,
}

impl RetrievalResult {
    /// Number of passages
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// True when nothing was retrieved
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Keys of the passages, in rank order
    pub fn keys(&self) -> Vec<ChunkKey> {
        self.passages.iter().map(|p| p.key.clone()).collect()
    }

    /// Render passages as numbered source blocks for an answer generator.
    ///
    /// Stops before the block that would push the context past `max_chars`.
    pub fn build_context(&self, max_chars: usize) -> String {
        let mut context = String::new();

        for (i, passage) in self.passages.iter().enumerate() {
            let block = format!(
                "[{}] {}\n\nContent:\n{}\n\n---\n\n",
                i + 1,
                passage.source_ref(),
                passage.text.trim()
            );
            if context.len() + block.len() > max_chars {
                break;
            }
            context.push_str(&block);
        }

        context
    }
}

/// What indexing did to the store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexOutcome {
    /// First version of the document written
    Indexed,
    /// Previous entries replaced
    Reindexed {
        /// Entries deleted before the new version was written
        removed: usize,
    },
    /// Stored entries already match; nothing written
    Unchanged,
}

/// Report for an index/reindex operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    /// Document ID
    pub document_id: String,
    /// What happened
    pub outcome: IndexOutcome,
    /// Chunks now stored for the document
    pub chunk_count: usize,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

/// Report for a delete operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteReport {
    /// Document ID
    pub document_id: String,
    /// Entries removed (0 for unknown documents)
    pub removed: usize,
}
