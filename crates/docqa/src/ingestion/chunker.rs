//! Token-bounded text chunking with overlap and span tracking

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use super::cleaner::normalize_text;
use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{content_hash, Chunk, ChunkKey, Document};

/// Preferred place to end a chunk
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SplitBoundary {
    /// Pack token by token
    Fixed,
    /// Keep Unicode sentences together where they fit
    #[default]
    Sentence,
    /// Keep blank-line separated paragraphs together where they fit
    Paragraph,
}

/// Text chunker with a token budget and overlap
pub struct TextChunker {
    /// Maximum tokens per chunk
    max_tokens: usize,
    /// Tokens repeated at the start of the next chunk
    overlap_tokens: usize,
    boundary: SplitBoundary,
    normalize: bool,
    paragraph_break: Regex,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(max_tokens: usize, overlap_tokens: usize, boundary: SplitBoundary) -> Result<Self> {
        if max_tokens == 0 {
            return Err(Error::config("max_tokens_per_chunk must be greater than zero"));
        }
        if overlap_tokens >= max_tokens {
            return Err(Error::config(format!(
                "overlap_tokens ({}) must be less than max_tokens_per_chunk ({})",
                overlap_tokens, max_tokens
            )));
        }

        let paragraph_break = Regex::new(r"\n[ \t]*\n")
            .map_err(|e| Error::internal(format!("paragraph pattern: {}", e)))?;

        Ok(Self {
            max_tokens,
            overlap_tokens,
            boundary,
            normalize: true,
            paragraph_break,
        })
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        let mut chunker = Self::new(
            config.max_tokens_per_chunk,
            config.overlap_tokens,
            config.split_boundary,
        )?;
        chunker.normalize = config.normalize_whitespace;
        Ok(chunker)
    }

    /// Toggle whitespace normalization
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Split a document into chunks.
    ///
    /// Spans refer to the normalized text when normalization is on.
    pub fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>> {
        if doc.id.trim().is_empty() {
            return Err(Error::invalid_document(&doc.id, "document id is empty"));
        }

        let text = if self.normalize {
            normalize_text(&doc.text)
        } else {
            doc.text.clone()
        };

        let token_starts: Vec<usize> = text
            .split_word_bound_indices()
            .filter(|(_, word)| word.chars().any(|c| !c.is_whitespace()))
            .map(|(offset, _)| offset)
            .collect();

        if token_starts.is_empty() {
            return Err(Error::invalid_document(&doc.id, "document has no text"));
        }

        let units = self.split_oversized(self.units(&text, &token_starts));
        let ranges = self.pack(&units);

        let span_start = |token: usize| if token == 0 { 0 } else { token_starts[token] };
        let span_end = |token: usize| {
            if token == token_starts.len() {
                text.len()
            } else {
                token_starts[token]
            }
        };

        let mut chunks = Vec::with_capacity(ranges.len());
        let mut previous_end = 0usize;

        for (index, (first, last)) in ranges.into_iter().enumerate() {
            let char_start = span_start(first);
            let char_end = span_end(last);
            let chunk_text = text[char_start..char_end].to_string();
            let overlap_len = if index == 0 { 0 } else { previous_end - char_start };

            chunks.push(Chunk {
                key: ChunkKey::new(&doc.id, index as u32),
                content_hash: content_hash(&chunk_text),
                text: chunk_text,
                char_start,
                char_end,
                overlap_len,
                metadata: doc.metadata.clone(),
            });
            previous_end = char_end;
        }

        tracing::debug!(
            document_id = %doc.id,
            tokens = token_starts.len(),
            chunks = chunks.len(),
            "Chunked document"
        );

        Ok(chunks)
    }

    /// Group tokens into boundary units as `[first, last)` token ranges
    fn units(&self, text: &str, token_starts: &[usize]) -> Vec<(usize, usize)> {
        let unit_starts: Vec<usize> = match self.boundary {
            SplitBoundary::Fixed => return (0..token_starts.len()).map(|t| (t, t + 1)).collect(),
            SplitBoundary::Sentence => text
                .split_sentence_bound_indices()
                .map(|(offset, _)| offset)
                .collect(),
            SplitBoundary::Paragraph => std::iter::once(0)
                .chain(self.paragraph_break.find_iter(text).map(|m| m.end()))
                .collect(),
        };

        let mut units = Vec::with_capacity(unit_starts.len());
        let mut token = 0usize;

        for (i, _) in unit_starts.iter().enumerate() {
            let unit_end = unit_starts.get(i + 1).copied().unwrap_or(usize::MAX);
            let first = token;
            while token < token_starts.len() && token_starts[token] < unit_end {
                token += 1;
            }
            // Whitespace-only units carry no tokens and fold into their neighbours
            if token > first {
                units.push((first, token));
            }
        }

        units
    }

    /// Cut units longer than the budget at token boundaries
    fn split_oversized(&self, units: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
        let mut out = Vec::with_capacity(units.len());
        for (mut first, last) in units {
            while last - first > self.max_tokens {
                out.push((first, first + self.max_tokens));
                first += self.max_tokens;
            }
            out.push((first, last));
        }
        out
    }

    /// Greedily pack units into chunk token ranges
    fn pack(&self, units: &[(usize, usize)]) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        let mut start = 0usize;
        let mut end = 0usize;
        let mut next = 0usize;

        while next < units.len() {
            let (unit_first, unit_last) = units[next];

            if unit_last - start <= self.max_tokens {
                end = unit_last;
                next += 1;
                continue;
            }

            ranges.push((start, end));

            // Overlap shrinks so the next unit still fits alongside it
            let unit_len = unit_last - unit_first;
            let overlap = self
                .overlap_tokens
                .min(self.max_tokens - unit_len)
                .min(end - start - 1);
            start = end - overlap;
        }

        ranges.push((start, end));
        ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn reassemble(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.fresh_text()).collect()
    }

    #[test]
    fn test_short_document_is_one_chunk() {
        let chunker = TextChunker::new(100, 10, SplitBoundary::Sentence).unwrap();
        let doc = Document::new("doc1", "A short document. It has two sentences.");

        let chunks = chunker.chunk(&doc).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].char_start, 0);
        assert_eq!(chunks[0].char_end, doc.text.len());
        assert_eq!(chunks[0].key, ChunkKey::new("doc1", 0));
        assert_eq!(chunks[0].overlap_len, 0);
    }

    #[test]
    fn test_fixed_chunks_with_overlap() {
        let chunker = TextChunker::new(10, 2, SplitBoundary::Fixed).unwrap();
        let doc = Document::new("doc1", words(25));

        let chunks = chunker.chunk(&doc).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].text.starts_with("w0 "));
        assert!(chunks[1].text.starts_with("w8 "));
        assert!(chunks[2].text.starts_with("w16 "));
        assert!(chunks[2].text.ends_with("w24"));
        assert_eq!(chunks[1].overlap_len, "w8 w9 ".len());
        assert_eq!(reassemble(&chunks), doc.text);
    }

    #[test]
    fn test_sentences_stay_whole() {
        let chunker = TextChunker::new(4, 0, SplitBoundary::Sentence).unwrap();
        let doc = Document::new("doc1", "One two three. Four five six. Seven eight nine.");

        let chunks = chunker.chunk(&doc).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.trim()).collect();
        assert_eq!(texts, vec!["One two three.", "Four five six.", "Seven eight nine."]);
        assert_eq!(reassemble(&chunks), doc.text);
    }

    #[test]
    fn test_oversized_sentence_is_split() {
        let chunker = TextChunker::new(5, 1, SplitBoundary::Sentence).unwrap();
        let doc = Document::new("doc1", words(12));

        let chunks = chunker.chunk(&doc).unwrap();
        assert!(chunks.len() >= 3);
        assert_eq!(reassemble(&chunks), doc.text);
        for chunk in &chunks {
            let tokens = chunk.text.split_whitespace().count();
            assert!(tokens <= 5, "chunk has {} tokens", tokens);
        }
    }

    #[test]
    fn test_paragraph_boundary() {
        let chunker = TextChunker::new(6, 0, SplitBoundary::Paragraph).unwrap();
        let doc = Document::new("doc1", "alpha beta gamma\n\ndelta epsilon\n\nzeta eta theta");

        let chunks = chunker.chunk(&doc).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.trim(), "alpha beta gamma\n\ndelta epsilon");
        assert_eq!(chunks[1].text, "zeta eta theta");
    }

    #[test]
    fn test_normalizes_before_chunking() {
        let chunker = TextChunker::new(100, 0, SplitBoundary::Sentence).unwrap();
        let doc = Document::new("doc1", "  spaced    out \n\n\n\n text  ");

        let chunks = chunker.chunk(&doc).unwrap();
        assert_eq!(chunks[0].text, "spaced out\n\ntext");
    }

    #[test]
    fn test_chunks_inherit_metadata() {
        let chunker = TextChunker::new(3, 0, SplitBoundary::Fixed).unwrap();
        let doc = Document::new("doc1", words(7)).with_filename("report.pdf");

        let chunks = chunker.chunk(&doc).unwrap();
        assert!(chunks
            .iter()
            .all(|c| c.metadata.filename.as_deref() == Some("report.pdf")));
        assert_eq!(chunks[0].content_hash, content_hash(&chunks[0].text));
    }

    #[test]
    fn test_rejects_empty_input() {
        let chunker = TextChunker::new(10, 2, SplitBoundary::Sentence).unwrap();

        let empty = chunker.chunk(&Document::new("doc1", "  \n\t "));
        assert!(matches!(empty, Err(Error::InvalidDocument { .. })));

        let no_id = chunker.chunk(&Document::new("", "some text"));
        assert!(matches!(no_id, Err(Error::InvalidDocument { .. })));
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(matches!(
            TextChunker::new(0, 0, SplitBoundary::Fixed),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            TextChunker::new(10, 10, SplitBoundary::Fixed),
            Err(Error::Config(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_spans_cover_text(
            text in "[a-zA-Z .,!?\n\t]{1,400}",
            max in 1usize..40,
            overlap_seed in 0usize..40,
            boundary in prop_oneof![
                Just(SplitBoundary::Fixed),
                Just(SplitBoundary::Sentence),
                Just(SplitBoundary::Paragraph),
            ],
            normalize in any::<bool>(),
        ) {
            prop_assume!(text.chars().any(|c| !c.is_whitespace()));
            let overlap = overlap_seed % max;
            let chunker = TextChunker::new(max, overlap, boundary)
                .unwrap()
                .with_normalization(normalize);

            let chunks = chunker.chunk(&Document::new("doc", text.clone())).unwrap();
            let expected = if normalize { normalize_text(&text) } else { text.clone() };

            prop_assert_eq!(reassemble(&chunks), expected.clone());
            prop_assert_eq!(chunks[0].char_start, 0);
            prop_assert_eq!(chunks[chunks.len() - 1].char_end, expected.len());
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert!(!chunk.text.trim().is_empty());
                prop_assert_eq!(chunk.chunk_index(), i as u32);
                if i > 0 {
                    prop_assert!(chunk.char_start <= chunks[i - 1].char_end);
                    prop_assert!(chunk.char_end > chunks[i - 1].char_end);
                }
            }
        }
    }
}
