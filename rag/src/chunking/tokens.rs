//! Token-window chunking.

use std::fmt;
use std::sync::Arc;

use recall_core::{Tokenizer, WhitespaceTokenizer};

use crate::error::Result;
use crate::types::{Chunk, Document};

use super::{ChunkStrategy, Chunker, Piece, ensure_content, finalize, skip_whitespace, validate_sizes};

/// Chunks text into windows of at most `max_tokens` tokens.
///
/// Each window is the longest prefix of the remaining text the tokenizer accepts. The next
/// window starts at the last `overlap` tokens of the previous one, located by searching for
/// those tokens backwards in the previous window. When they cannot be found the next window
/// starts where the previous one ended.
///
/// Without an explicit tokenizer, [`WhitespaceTokenizer`] is used.
#[derive(Clone)]
pub struct TokenChunker {
    max_tokens: usize,
    overlap: usize,
    tokenizer: Arc<dyn Tokenizer>,
}

impl fmt::Debug for TokenChunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenChunker")
            .field("max_tokens", &self.max_tokens)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl TokenChunker {
    /// Creates a token chunker using [`WhitespaceTokenizer`].
    ///
    /// # Errors
    ///
    /// Returns an error when `max_tokens` is zero or `overlap >= max_tokens`.
    pub fn new(max_tokens: usize, overlap: usize) -> Result<Self> {
        validate_sizes(max_tokens, overlap)?;
        Ok(Self {
            max_tokens,
            overlap,
            tokenizer: Arc::new(WhitespaceTokenizer),
        })
    }

    /// Replaces the tokenizer.
    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Byte length of the window starting at `rest`, always at least one character.
    fn window_len(&self, rest: &str) -> usize {
        let prefix = self.tokenizer.truncate_to_tokens(rest, self.max_tokens);
        let len = if !prefix.is_empty() && rest.starts_with(prefix.as_str()) {
            prefix.len()
        } else {
            // Tokenizers that normalize text cannot report a prefix; fall back to whitespace.
            WhitespaceTokenizer
                .truncate_to_tokens(rest, self.max_tokens)
                .len()
        };
        let first_char = rest.chars().next().map_or(0, char::len_utf8);
        len.max(first_char)
    }

    /// Start of the last `overlap` tokens of `text[start..end]`, if they can be located.
    fn overlap_start(&self, text: &str, start: usize, end: usize) -> Option<usize> {
        if self.overlap == 0 {
            return None;
        }
        let window = &text[start..end];
        let tokens = self.tokenizer.tokenize(window);
        if tokens.len() <= self.overlap {
            return None;
        }

        let mut cursor = window.len();
        for token in tokens[tokens.len() - self.overlap..].iter().rev() {
            cursor = window[..cursor].rfind(token.as_str())?;
        }
        (cursor > 0).then_some(start + cursor)
    }
}

impl Chunker for TokenChunker {
    fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>> {
        ensure_content(doc)?;
        let text = &doc.content;

        let mut pieces = Vec::new();
        if self.tokenizer.count_tokens(text) <= self.max_tokens {
            pieces.push(Piece::whole(text));
        } else {
            let mut start = skip_whitespace(text, 0);
            while start < text.len() {
                let end = start + self.window_len(&text[start..]);
                pieces.push(Piece {
                    start,
                    end,
                    content: text[start..end].to_string(),
                });
                if skip_whitespace(text, end) >= text.len() {
                    break;
                }
                let next = self.overlap_start(text, start, end).unwrap_or(end);
                start = skip_whitespace(text, next);
            }
        }

        Ok(finalize(
            doc,
            pieces,
            ChunkStrategy::Tokens,
            Some(&self.tokenizer),
        ))
    }

    fn name(&self) -> &'static str {
        "tokens"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::test_support::assert_covers;

    const COUNTING: &str = "one two three four five six seven eight nine ten";

    fn contents(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.content.as_str()).collect()
    }

    #[test]
    fn windows_without_overlap() {
        let doc = Document::new("doc", COUNTING);
        let chunks = TokenChunker::new(4, 0).unwrap().chunk(&doc).unwrap();
        assert_eq!(
            contents(&chunks),
            [
                "one two three four",
                "five six seven eight",
                "nine ten"
            ]
        );
        assert!(chunks.iter().all(|c| c.token_count <= 4));
        assert_covers(&doc, &chunks);
    }

    #[test]
    fn overlap_repeats_trailing_tokens() {
        let doc = Document::new("doc", COUNTING);
        let chunks = TokenChunker::new(4, 1).unwrap().chunk(&doc).unwrap();
        assert_eq!(
            contents(&chunks),
            [
                "one two three four",
                "four five six seven",
                "seven eight nine ten"
            ]
        );
        for pair in chunks.windows(2) {
            let previous = WhitespaceTokenizer.tokenize(&pair[0].content);
            let next = WhitespaceTokenizer.tokenize(&pair[1].content);
            assert!(next.iter().any(|token| previous.contains(token)));
        }
    }

    #[test]
    fn repeated_tokens_still_progress() {
        let doc = Document::new("doc", "la ".repeat(20));
        let chunks = TokenChunker::new(3, 2).unwrap().chunk(&doc).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.windows(2).all(|w| w[1].start_pos > w[0].start_pos));
        assert_covers(&doc, &chunks);
    }

    #[test]
    fn fitting_text_is_one_chunk() {
        let doc = Document::new("doc", "just a few words");
        let chunks = TokenChunker::new(10, 2).unwrap().chunk(&doc).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_count, 4);
    }
}
