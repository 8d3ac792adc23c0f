//! Text chunking strategies.
//!
//! This module provides the [`Chunker`] trait, one implementation per [`ChunkStrategy`], and
//! [`TextChunker`], which picks the implementation from [`ChunkingOptions`].
//!
//! Every chunker returns at least one chunk for non-empty input and exactly one when the input
//! fits in `max_chunk_size`. Sizes are counted in tokens when a [`Tokenizer`] is attached and in
//! characters otherwise, except [`FixedSizeChunker`], which works on bytes.

mod fixed;
mod paragraph;
mod semantic;
mod sentence;
mod tokens;

pub use fixed::FixedSizeChunker;
pub use paragraph::ParagraphChunker;
pub use semantic::SemanticChunker;
pub use sentence::SentenceChunker;
pub use tokens::TokenChunker;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use recall_core::{Tokenizer, WhitespaceTokenizer};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::types::{CHUNK_STRATEGY_KEY, Chunk, Document};

/// Trait for text chunking strategies.
///
/// Chunkers split documents into smaller pieces that can be individually embedded and
/// searched. Output is deterministic: the same document and settings always produce the same
/// boundaries and ids.
pub trait Chunker: Send + Sync {
    /// Splits a document into chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyDocument`] when the content is empty or whitespace.
    fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>>;

    /// Returns the name of this chunking strategy.
    fn name(&self) -> &'static str;
}

/// Available chunking strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChunkStrategy {
    /// Greedy token windows with token overlap.
    Tokens,
    /// Whole sentences, overlap seeded with trailing sentences.
    #[default]
    Sentences,
    /// Separator-delimited paragraphs joined by blank lines.
    Paragraphs,
    /// Byte windows with a fixed stride.
    FixedSize,
    /// Sentences grouped until the topic appears to change.
    Semantic,
}

impl ChunkStrategy {
    /// Returns the string tag of this strategy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tokens => "tokens",
            Self::Sentences => "sentences",
            Self::Paragraphs => "paragraphs",
            Self::FixedSize => "fixed_size",
            Self::Semantic => "semantic",
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStrategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tokens" => Ok(Self::Tokens),
            "sentences" => Ok(Self::Sentences),
            "paragraphs" => Ok(Self::Paragraphs),
            "fixed_size" => Ok(Self::FixedSize),
            "semantic" => Ok(Self::Semantic),
            other => Err(RagError::InvalidStrategy(other.to_string())),
        }
    }
}

impl TryFrom<String> for ChunkStrategy {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ChunkStrategy> for String {
    fn from(strategy: ChunkStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

/// Settings for [`TextChunker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingOptions {
    /// Strategy to apply.
    pub strategy: ChunkStrategy,
    /// Maximum chunk size, must be positive.
    pub max_chunk_size: usize,
    /// Overlap between consecutive chunks, must be below `max_chunk_size`.
    pub overlap: usize,
    /// Paragraph separators, tried longest first.
    pub separators: Vec<String>,
    /// Keep the original text between units instead of re-joining them.
    pub preserve_structure: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            max_chunk_size: 512,
            overlap: 50,
            separators: vec!["\n\n".to_string(), "\n".to_string()],
            preserve_structure: false,
        }
    }
}

impl ChunkingOptions {
    /// Creates default options for `strategy`.
    #[must_use]
    pub fn new(strategy: ChunkStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Sets the maximum chunk size.
    #[must_use]
    pub const fn max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    /// Sets the overlap.
    #[must_use]
    pub const fn overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Sets the paragraph separators.
    #[must_use]
    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps original text between units.
    #[must_use]
    pub const fn preserve_structure(mut self, preserve: bool) -> Self {
        self.preserve_structure = preserve;
        self
    }

    /// Checks size and overlap.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidChunkSize`] or [`RagError::InvalidOverlap`].
    pub fn validate(&self) -> Result<()> {
        validate_sizes(self.max_chunk_size, self.overlap)
    }
}

fn validate_sizes(max_chunk_size: usize, overlap: usize) -> Result<()> {
    if max_chunk_size == 0 {
        return Err(RagError::InvalidChunkSize(max_chunk_size));
    }
    if overlap >= max_chunk_size {
        return Err(RagError::InvalidOverlap {
            overlap,
            max_chunk_size,
        });
    }
    Ok(())
}

/// Chunker selected by [`ChunkingOptions::strategy`].
///
/// # Example
///
/// ```rust
/// use recall_rag::chunking::{ChunkStrategy, Chunker, ChunkingOptions, TextChunker};
/// use recall_rag::Document;
///
/// let options = ChunkingOptions::new(ChunkStrategy::Sentences).max_chunk_size(40).overlap(0);
/// let chunker = TextChunker::new(options).unwrap();
/// let doc = Document::new("doc", "First sentence here. Second one follows. A third closes.");
/// let chunks = chunker.chunk(&doc).unwrap();
/// assert!(chunks.len() > 1);
/// assert_eq!(chunks[0].id, "doc_chunk_0");
/// ```
pub struct TextChunker {
    options: ChunkingOptions,
    inner: Box<dyn Chunker>,
}

impl fmt::Debug for TextChunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextChunker")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TextChunker {
    /// Creates a chunker that measures in characters.
    ///
    /// # Errors
    ///
    /// Returns an error when the options fail [`ChunkingOptions::validate`].
    pub fn new(options: ChunkingOptions) -> Result<Self> {
        Self::build(options, None)
    }

    /// Creates a chunker that measures with `tokenizer`.
    ///
    /// # Errors
    ///
    /// Returns an error when the options fail [`ChunkingOptions::validate`].
    pub fn with_tokenizer(options: ChunkingOptions, tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        Self::build(options, Some(tokenizer))
    }

    fn build(options: ChunkingOptions, tokenizer: Option<Arc<dyn Tokenizer>>) -> Result<Self> {
        options.validate()?;
        let max = options.max_chunk_size;
        let overlap = options.overlap;
        let inner: Box<dyn Chunker> = match options.strategy {
            ChunkStrategy::Tokens => {
                let chunker = TokenChunker::new(max, overlap)?;
                Box::new(match tokenizer {
                    Some(tokenizer) => chunker.with_tokenizer(tokenizer),
                    None => chunker,
                })
            }
            ChunkStrategy::Sentences => Box::new(
                SentenceChunker::new(max, overlap)?
                    .preserve_structure(options.preserve_structure)
                    .tokenizer(tokenizer),
            ),
            ChunkStrategy::Paragraphs => Box::new(
                ParagraphChunker::new(max, overlap)?
                    .separators(options.separators.clone())
                    .preserve_structure(options.preserve_structure)
                    .tokenizer(tokenizer),
            ),
            ChunkStrategy::FixedSize => Box::new(FixedSizeChunker::new(max, overlap)?),
            ChunkStrategy::Semantic => Box::new(
                SemanticChunker::new(max)?
                    .preserve_structure(options.preserve_structure)
                    .tokenizer(tokenizer),
            ),
        };
        Ok(Self { options, inner })
    }

    /// Returns the options this chunker was built from.
    pub const fn options(&self) -> &ChunkingOptions {
        &self.options
    }
}

impl Chunker for TextChunker {
    fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>> {
        self.inner.chunk(doc)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Byte range of one unit (sentence, paragraph, window) in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
}

/// A chunk before ids and metadata are stamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Piece {
    pub start: usize,
    pub end: usize,
    pub content: String,
}

impl Piece {
    fn whole(text: &str) -> Self {
        Self {
            start: 0,
            end: text.len(),
            content: text.to_string(),
        }
    }
}

/// Size measure: tokens with a tokenizer, characters without.
#[derive(Clone, Default)]
pub(crate) struct Measure {
    tokenizer: Option<Arc<dyn Tokenizer>>,
}

impl fmt::Debug for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.tokenizer.is_some() { "tokens" } else { "chars" })
    }
}

impl Measure {
    pub(crate) const fn new(tokenizer: Option<Arc<dyn Tokenizer>>) -> Self {
        Self { tokenizer }
    }

    pub(crate) fn of(&self, text: &str) -> usize {
        self.tokenizer
            .as_ref()
            .map_or_else(|| text.chars().count(), |t| t.count_tokens(text))
    }

    pub(crate) fn tokenizer(&self) -> Option<&Arc<dyn Tokenizer>> {
        self.tokenizer.as_ref()
    }

    /// Splits `span` into consecutive sub-spans that each measure at most `max`.
    pub(crate) fn split(&self, text: &str, span: Span, max: usize) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut start = span.start;
        while start < span.end {
            let rest = &text[start..span.end];
            let taken = match &self.tokenizer {
                Some(tokenizer) => {
                    let prefix = tokenizer.truncate_to_tokens(rest, max);
                    if !prefix.is_empty() && rest.starts_with(prefix.as_str()) {
                        prefix.len()
                    } else {
                        // Normalizing tokenizers return no literal prefix; cut on whitespace.
                        WhitespaceTokenizer.truncate_to_tokens(rest, max).len()
                    }
                }
                None => rest
                    .char_indices()
                    .nth(max)
                    .map_or(rest.len(), |(idx, _)| idx),
            };
            let taken = if taken == 0 {
                rest.chars().next().map_or(rest.len(), char::len_utf8)
            } else {
                taken
            };
            spans.push(Span {
                start,
                end: start + taken,
            });
            start += taken;
            start += text[start..span.end].len() - text[start..span.end].trim_start().len();
        }
        spans
    }
}

/// Fails on empty or whitespace-only content.
pub(crate) fn ensure_content(doc: &Document) -> Result<()> {
    if doc.content.trim().is_empty() {
        return Err(RagError::EmptyDocument);
    }
    Ok(())
}

/// Groups `units` into pieces of at most `max`, seeding each new piece with the trailing units
/// of the previous one that fit within `overlap`.
pub(crate) fn accumulate(
    text: &str,
    units: &[Span],
    max: usize,
    overlap: usize,
    joiner: &str,
    preserve_structure: bool,
    measure: &Measure,
) -> Vec<Piece> {
    let build = |group: &[Span]| render(text, group, joiner, preserve_structure);

    let mut pieces = Vec::new();
    let mut current: Vec<Span> = Vec::new();

    for &unit in units {
        if measure.of(&text[unit.start..unit.end]) > max {
            if !current.is_empty() {
                pieces.push(build(&current));
                current.clear();
            }
            for part in measure.split(text, unit, max) {
                pieces.push(build(&[part]));
            }
            continue;
        }

        if !current.is_empty() {
            current.push(unit);
            let fits = measure.of(&build(&current).content) <= max;
            current.pop();
            if !fits {
                pieces.push(build(&current));
                current = seed(text, &current, overlap, joiner, preserve_structure, measure);
                // Drop seed units from the front until the next unit fits.
                while !current.is_empty() {
                    current.push(unit);
                    let fits = measure.of(&build(&current).content) <= max;
                    current.pop();
                    if fits {
                        break;
                    }
                    current.remove(0);
                }
            }
        }
        current.push(unit);
    }

    if !current.is_empty() {
        pieces.push(build(&current));
    }
    pieces
}

/// Trailing units of `group` whose rendered size stays within `overlap`.
///
/// When even the last unit is larger than `overlap`, its trailing words are carried instead.
fn seed(
    text: &str,
    group: &[Span],
    overlap: usize,
    joiner: &str,
    preserve_structure: bool,
    measure: &Measure,
) -> Vec<Span> {
    if overlap == 0 {
        return Vec::new();
    }
    let mut from = group.len();
    while from > 0 {
        let candidate = &group[from - 1..];
        if measure.of(&render(text, candidate, joiner, preserve_structure).content) > overlap {
            break;
        }
        from -= 1;
    }
    if from < group.len() {
        return group[from..].to_vec();
    }
    group
        .last()
        .and_then(|&last| tail_words(text, last, overlap, measure))
        .into_iter()
        .collect()
}

/// Longest suffix of `unit` that starts at a word and measures at most `overlap`.
fn tail_words(text: &str, unit: Span, overlap: usize, measure: &Measure) -> Option<Span> {
    let slice = &text[unit.start..unit.end];
    let mut word_starts = Vec::new();
    let mut after_space = false;
    for (idx, ch) in slice.char_indices() {
        if ch.is_whitespace() {
            after_space = true;
        } else if after_space {
            word_starts.push(idx);
            after_space = false;
        }
    }
    word_starts
        .into_iter()
        .rev()
        .take_while(|&idx| measure.of(&slice[idx..]) <= overlap)
        .last()
        .map(|idx| Span {
            start: unit.start + idx,
            end: unit.end,
        })
}

fn render(text: &str, group: &[Span], joiner: &str, preserve_structure: bool) -> Piece {
    let start = group.first().map_or(0, |span| span.start);
    let end = group.last().map_or(0, |span| span.end);
    let content = if preserve_structure {
        text[start..end].to_string()
    } else {
        group
            .iter()
            .map(|span| &text[span.start..span.end])
            .collect::<Vec<_>>()
            .join(joiner)
    };
    Piece {
        start,
        end,
        content,
    }
}

/// Stamps ids, indices, token counts and metadata onto raw pieces.
pub(crate) fn finalize(
    doc: &Document,
    pieces: Vec<Piece>,
    strategy: ChunkStrategy,
    tokenizer: Option<&Arc<dyn Tokenizer>>,
) -> Vec<Chunk> {
    pieces
        .into_iter()
        .filter(|piece| !piece.content.trim().is_empty())
        .enumerate()
        .map(|(index, piece)| {
            let token_count = tokenizer.map_or_else(
                || estimate_tokens(&piece.content),
                |t| t.count_tokens(&piece.content),
            );
            let mut metadata = doc.metadata.clone();
            metadata.insert(CHUNK_STRATEGY_KEY.into(), strategy.as_str().into());
            Chunk {
                id: Chunk::make_id(&doc.id, index),
                content: piece.content,
                document_id: doc.id.clone(),
                index,
                start_pos: piece.start,
                end_pos: piece.end,
                token_count,
                metadata,
                vector: None,
            }
        })
        .collect()
}

/// Rough token estimate of four characters per token.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Largest char boundary at or below `idx`.
pub(crate) fn floor_char_boundary(text: &str, idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    let mut idx = idx;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Smallest char boundary at or above `idx`.
pub(crate) fn ceil_char_boundary(text: &str, idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    let mut idx = idx;
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Advances `idx` past any whitespace.
pub(crate) fn skip_whitespace(text: &str, idx: usize) -> usize {
    idx + (text[idx..].len() - text[idx..].trim_start().len())
}
