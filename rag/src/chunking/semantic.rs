//! Topic-boundary chunking.

use std::collections::BTreeSet;
use std::sync::Arc;

use recall_core::Tokenizer;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{RagError, Result};
use crate::types::{Chunk, Document};

use super::sentence::sentence_spans;
use super::{ChunkStrategy, Chunker, Measure, Piece, Span, ensure_content, finalize, render};

/// A sentence opens a new chunk when its coherence falls below this share of the previous
/// sentence's coherence.
const COHERENCE_DROP: f32 = 0.7;

/// Groups sentences while they keep sharing vocabulary with the chunk so far.
///
/// Coherence of a sentence is the share of its distinct words (longer than two characters,
/// case-folded) already seen in the current chunk. A chunk closes when coherence drops below
/// 70% of the previous sentence's coherence, or when the next sentence would exceed the budget.
/// Chunks do not overlap.
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    max_chunk_size: usize,
    preserve_structure: bool,
    measure: Measure,
}

impl SemanticChunker {
    /// Creates a semantic chunker measuring in characters.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidChunkSize`] when `max_chunk_size` is zero.
    pub fn new(max_chunk_size: usize) -> Result<Self> {
        if max_chunk_size == 0 {
            return Err(RagError::InvalidChunkSize(max_chunk_size));
        }
        Ok(Self {
            max_chunk_size,
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

    fn group(&self, text: &str) -> Vec<Piece> {
        let build = |group: &[Span]| render(text, group, " ", self.preserve_structure);

        let mut pieces = Vec::new();
        let mut current: Vec<Span> = Vec::new();
        let mut seen = BTreeSet::new();
        let mut previous = 1.0f32;

        for span in sentence_spans(text) {
            let sentence = &text[span.start..span.end];

            if self.measure.of(sentence) > self.max_chunk_size {
                if !current.is_empty() {
                    pieces.push(build(&current));
                    current.clear();
                    seen.clear();
                }
                for part in self.measure.split(text, span, self.max_chunk_size) {
                    pieces.push(build(&[part]));
                }
                previous = 1.0;
                continue;
            }

            if current.is_empty() {
                current.push(span);
                seen = words(sentence);
                previous = 1.0;
                continue;
            }

            let score = coherence(sentence, &seen);
            current.push(span);
            let fits = self.measure.of(&build(&current).content) <= self.max_chunk_size;
            current.pop();

            if fits && score >= COHERENCE_DROP * previous {
                current.push(span);
                seen.extend(words(sentence));
                previous = score;
            } else {
                pieces.push(build(&current));
                current = vec![span];
                seen = words(sentence);
                previous = 1.0;
            }
        }

        if !current.is_empty() {
            pieces.push(build(&current));
        }
        pieces
    }
}

/// Distinct case-folded words longer than two characters.
fn words(text: &str) -> BTreeSet<String> {
    text.unicode_words()
        .filter(|word| word.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Share of `sentence`'s words already in `seen`.
///
/// Against an empty vocabulary every sentence scores `1.0`; a sentence without qualifying
/// words scores `0.0`.
#[allow(clippy::cast_precision_loss)]
fn coherence(sentence: &str, seen: &BTreeSet<String>) -> f32 {
    if seen.is_empty() {
        return 1.0;
    }
    let sentence_words = words(sentence);
    if sentence_words.is_empty() {
        return 0.0;
    }
    let shared = sentence_words.iter().filter(|w| seen.contains(*w)).count();
    shared as f32 / sentence_words.len() as f32
}

impl Chunker for SemanticChunker {
    fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>> {
        ensure_content(doc)?;
        let text = &doc.content;

        let pieces = if self.measure.of(text) <= self.max_chunk_size {
            vec![Piece::whole(text)]
        } else {
            self.group(text)
        };

        Ok(finalize(
            doc,
            pieces,
            ChunkStrategy::Semantic,
            self.measure.tokenizer(),
        ))
    }

    fn name(&self) -> &'static str {
        "semantic"
    }
}
