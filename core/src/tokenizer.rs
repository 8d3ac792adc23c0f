//! Token counting interface used by chunking and context assembly.
//!
//! Exact tokenizer fidelity is not a goal of the engine: any approximate counter works, as long
//! as [`Tokenizer::truncate_to_tokens`] returns a prefix of its input.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Counts, splits and truncates text by tokens.
pub trait Tokenizer: Send + Sync {
    /// Returns the number of tokens in `text`.
    fn count_tokens(&self, text: &str) -> usize;

    /// Splits `text` into tokens.
    fn tokenize(&self, text: &str) -> Vec<String>;

    /// Returns the longest prefix of `text` that holds at most `max_tokens` tokens.
    fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String;
}

/// Whitespace-delimited tokenizer.
///
/// Every maximal run of non-whitespace characters counts as one token. This is a cheap stand-in
/// for a model tokenizer and tends to undercount by roughly a third on English prose.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(ToString::to_string).collect()
    }

    fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }
        let mut seen = 0usize;
        let mut in_token = false;
        for (idx, ch) in text.char_indices() {
            if ch.is_whitespace() {
                if in_token {
                    in_token = false;
                    if seen == max_tokens {
                        return text[..idx].to_string();
                    }
                }
            } else if !in_token {
                in_token = true;
                seen += 1;
            }
        }
        text.to_string()
    }
}
