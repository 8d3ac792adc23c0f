//! Sentence-based text chunking.

use std::sync::{Arc, LazyLock};

use recall_core::Tokenizer;
use regex::Regex;

use crate::error::Result;
use crate::types::{Chunk, Document};

use super::{
    ChunkStrategy, Chunker, Measure, Piece, Span, accumulate, ensure_content, finalize,
    skip_whitespace, validate_sizes,
};

/// Chunks text by sentence boundaries.
///
/// Sentences end at a run of `.`, `!` or `?` followed by whitespace. Whole sentences are
/// grouped until the next one would exceed the budget; each new chunk starts with the trailing
/// sentences of the previous one that fit within `overlap`.
///
/// # Example
///
/// ```rust
/// use recall_rag::chunking::{Chunker, SentenceChunker};
/// use recall_rag::Document;
///
/// let chunker = SentenceChunker::new(500, 0).unwrap();
/// let doc = Document::new("doc1", "First sentence. Second sentence. Third sentence.");
/// let chunks = chunker.chunk(&doc).unwrap();
/// assert_eq!(chunks.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    max_chunk_size: usize,
    overlap: usize,
    preserve_structure: bool,
    measure: Measure,
}

impl SentenceChunker {
    /// Creates a sentence chunker measuring in characters.
    ///
    /// # Errors
    ///
    /// Returns an error when `max_chunk_size` is zero or `overlap >= max_chunk_size`.
    pub fn new(max_chunk_size: usize, overlap: usize) -> Result<Self> {
        validate_sizes(max_chunk_size, overlap)?;
        Ok(Self {
            max_chunk_size,
            overlap,
            preserve_structure: false,
            measure: Measure::default(),
        })
    }

    /// Keeps the original text between sentences instead of joining with a space.
    #[must_use]
    pub const fn preserve_structure(mut self, preserve: bool) -> Self {
        self.preserve_structure = preserve;
        self
    }

    /// Measures in tokens with `tokenizer`, or in characters with `None`.
    #[must_use]
    pub fn tokenizer(mut self, tokenizer: Option<Arc<dyn Tokenizer>>) -> Self {
        self.measure = Measure::new(tokenizer);
        self
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>> {
        ensure_content(doc)?;
        let text = &doc.content;

        let pieces = if self.measure.of(text) <= self.max_chunk_size {
            vec![Piece::whole(text)]
        } else {
            accumulate(
                text,
                &sentence_spans(text),
                self.max_chunk_size,
                self.overlap,
                " ",
                self.preserve_structure,
                &self.measure,
            )
        };

        Ok(finalize(
            doc,
            pieces,
            ChunkStrategy::Sentences,
            self.measure.tokenizer(),
        ))
    }

    fn name(&self) -> &'static str {
        "sentences"
    }
}

static SENTENCE_END: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[.!?]+\s+").ok());

/// Splits `text` at runs of `.`, `!` or `?` followed by whitespace.
///
/// Spans exclude the trailing whitespace; empty sentences are dropped.
pub(super) fn sentence_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start = skip_whitespace(text, 0);
    if let Some(pattern) = SENTENCE_END.as_ref() {
        for end in pattern.find_iter(text) {
            spans.push(Span {
                start,
                end: end.start() + end.as_str().trim_end().len(),
            });
            start = end.end();
        }
    }

    let end = start + text[start..].trim_end().len();
    if end > start {
        spans.push(Span { start, end });
    }
    spans
}
