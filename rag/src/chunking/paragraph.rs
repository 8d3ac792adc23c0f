//! Paragraph-based text chunking.

use std::sync::Arc;

use recall_core::Tokenizer;

use crate::error::Result;
use crate::types::{Chunk, Document};

use super::{
    ChunkStrategy, Chunker, Measure, Piece, Span, accumulate, ensure_content, finalize,
    validate_sizes,
};

/// Chunks text by paragraph separators.
///
/// Paragraphs are grouped like sentences in [`SentenceChunker`](super::SentenceChunker) and
/// re-joined with a blank line.
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    max_chunk_size: usize,
    overlap: usize,
    separators: Vec<String>,
    preserve_structure: bool,
    measure: Measure,
}

impl ParagraphChunker {
    /// Creates a paragraph chunker splitting on `"\n\n"` and `"\n"`.
    ///
    /// # Errors
    ///
    /// Returns an error when `max_chunk_size` is zero or `overlap >= max_chunk_size`.
    pub fn new(max_chunk_size: usize, overlap: usize) -> Result<Self> {
        validate_sizes(max_chunk_size, overlap)?;
        Ok(Self {
            max_chunk_size,
            overlap,
            separators: vec!["\n\n".to_string(), "\n".to_string()],
            preserve_structure: false,
            measure: Measure::default(),
        })
    }

    /// Replaces the separators. Empty separators are ignored.
    #[must_use]
    pub fn separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    /// Keeps the original text between paragraphs instead of joining with a blank line.
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

    fn paragraph_spans(&self, text: &str) -> Vec<Span> {
        let mut separators: Vec<&str> = self
            .separators
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        separators.sort_by_key(|s| std::cmp::Reverse(s.len()));

        let mut spans = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i < text.len() {
            if let Some(separator) = separators.iter().find(|s| text[i..].starts_with(**s)) {
                push_trimmed(text, start, i, &mut spans);
                i += separator.len();
                start = i;
            } else {
                i += text[i..].chars().next().map_or(1, char::len_utf8);
            }
        }
        push_trimmed(text, start, text.len(), &mut spans);
        spans
    }
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<Span>) {
    let slice = &text[start..end];
    let trimmed_start = start + (slice.len() - slice.trim_start().len());
    let trimmed_end = start + slice.trim_end().len();
    if trimmed_end > trimmed_start {
        spans.push(Span {
            start: trimmed_start,
            end: trimmed_end,
        });
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>> {
        ensure_content(doc)?;
        let text = &doc.content;

        let pieces = if self.measure.of(text) <= self.max_chunk_size {
            vec![Piece::whole(text)]
        } else {
            accumulate(
                text,
                &self.paragraph_spans(text),
                self.max_chunk_size,
                self.overlap,
                "\n\n",
                self.preserve_structure,
                &self.measure,
            )
        };

        Ok(finalize(
            doc,
            pieces,
            ChunkStrategy::Paragraphs,
            self.measure.tokenizer(),
        ))
    }

    fn name(&self) -> &'static str {
        "paragraphs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::test_support::assert_covers;

    fn contents(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.content.as_str()).collect()
    }

    #[test]
    fn groups_paragraphs_with_blank_line_join() {
        let doc = Document::new("doc", "First para.\n\nSecond para.\nThird para.\n\n\nFourth para.");
        let chunks = ParagraphChunker::new(30, 0).unwrap().chunk(&doc).unwrap();

        assert_eq!(
            contents(&chunks),
            [
                "First para.\n\nSecond para.",
                "Third para.\n\nFourth para."
            ]
        );
        assert_covers(&doc, &chunks);
    }

    #[test]
    fn overlap_seeds_previous_paragraph() {
        let doc = Document::new("doc", "aaaa\n\nbbbb\n\ncccc\n\ndddd");
        let chunks = ParagraphChunker::new(10, 4).unwrap().chunk(&doc).unwrap();
        assert_eq!(contents(&chunks), ["aaaa\n\nbbbb", "bbbb\n\ncccc", "cccc\n\ndddd"]);
    }

    #[test]
    fn custom_separators() {
        let doc = Document::new("doc", "alpha|beta|gamma");
        let chunks = ParagraphChunker::new(12, 0)
            .unwrap()
            .separators(vec!["|".to_string()])
            .chunk(&doc)
            .unwrap();
        assert_eq!(contents(&chunks), ["alpha\n\nbeta", "gamma"]);
    }

    #[test]
    fn separators_prefer_longest_match() {
        let chunker = ParagraphChunker::new(5, 0).unwrap();
        let text = "a\n\nb\nc";
        let spans: Vec<_> = chunker
            .paragraph_spans(text)
            .into_iter()
            .map(|s| &text[s.start..s.end])
            .collect();
        assert_eq!(spans, ["a", "b", "c"]);
    }
}
