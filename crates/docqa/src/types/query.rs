//! Query and filter types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata filter applied inside a vector search.
///
/// All conditions must hold: the entry's document is in `document_ids` (when
/// set) and every tag in `tags` is present with the same value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchFilter {
    /// Restrict to these documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
    /// Exact tag matches
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl SearchFilter {
    /// Filter that matches everything
    pub fn none() -> Self {
        Self::default()
    }

    /// Filter restricted to a set of documents
    pub fn documents<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            document_ids: Some(ids.into_iter().map(Into::into).collect()),
            tags: BTreeMap::new(),
        }
    }

    /// Add a required tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// True when nothing is filtered
    pub fn is_empty(&self) -> bool {
        self.document_ids.is_none() && self.tags.is_empty()
    }

    /// Evaluate the filter against an entry's document ID and tags
    pub fn matches(&self, document_id: &str, tags: &BTreeMap<String, String>) -> bool {
        if let Some(ids) = &self.document_ids {
            if !ids.iter().any(|id| id == document_id) {
                return false;
            }
        }
        self.tags
            .iter()
            .all(|(key, value)| tags.get(key) == Some(value))
    }
}

/// Per-query options; unset fields fall back to the retrieval configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Number of passages wanted
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Metadata filter
    #[serde(default)]
    pub filter: SearchFilter,
    /// Passages per document (0 = unlimited)
    #[serde(default)]
    pub max_passages_per_document: Option<usize>,
    /// Minimum similarity score
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl QueryOptions {
    /// Options asking for `top_k` passages
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k: Some(top_k),
            ..Self::default()
        }
    }

    /// Set the metadata filter
    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Allow several passages from the same document
    pub fn with_max_passages_per_document(mut self, max: usize) -> Self {
        self.max_passages_per_document = Some(max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matching() {
        let mut tags = BTreeMap::new();
        tags.insert("project".to_string(), "alpha".to_string());

        assert!(SearchFilter::none().matches("doc1", &tags));
        assert!(SearchFilter::documents(["doc1", "doc2"]).matches("doc1", &tags));
        assert!(!SearchFilter::documents(["doc2"]).matches("doc1", &tags));
        assert!(SearchFilter::none().with_tag("project", "alpha").matches("doc1", &tags));
        assert!(!SearchFilter::none().with_tag("project", "beta").matches("doc1", &tags));
        assert!(!SearchFilter::none().with_tag("lang", "de").matches("doc1", &tags));
    }
}
