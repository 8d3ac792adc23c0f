//! Context assembly.
//!
//! Turns a [`RetrievalResult`] into one bounded string for prompting: documents are optionally
//! sorted, rendered through a template, joined, and truncated to the token budget.

use std::fmt::Write as _;
use std::sync::Arc;

use recall_core::Tokenizer;

pub use crate::config::{ContextConfig, Truncation};
use crate::similarity::compare_scores;
use crate::types::{Document, Metadata, RetrievalResult};

/// Marker placed between the kept ends under [`Truncation::Middle`].
pub const TRUNCATION_MARKER: &str = "... [truncated] ...";

/// Below this budget middle truncation keeps only the head.
const MIN_MIDDLE_BUDGET: usize = 100;

/// Words per token when no tokenizer is attached.
const WORDS_PER_TOKEN: f64 = 0.75;

/// Builds prompt context from retrieval results.
///
/// # Example
///
/// ```rust
/// use recall_rag::context::{ContextBuilder, ContextConfig};
/// use recall_rag::{Document, Query, RetrievalResult, ScoredDocument};
///
/// let hits = vec![ScoredDocument { document: Document::new("a", "Rust is fast."), score: 0.9 }];
/// let result = RetrievalResult::from_hits(Query::new("rust"), hits, 1);
///
/// let builder = ContextBuilder::new(ContextConfig::builder().template("[{id}] {content}").build());
/// assert_eq!(builder.build(&result), "[a] Rust is fast.");
/// ```
#[derive(Clone)]
pub struct ContextBuilder {
    config: ContextConfig,
    tokenizer: Option<Arc<dyn Tokenizer>>,
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("config", &self.config)
            .field("tokenizer", &self.tokenizer.is_some())
            .finish()
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl ContextBuilder {
    /// Creates a builder that estimates tokens from word counts.
    #[must_use]
    pub const fn new(config: ContextConfig) -> Self {
        Self {
            config,
            tokenizer: None,
        }
    }

    /// Counts and truncates with `tokenizer`.
    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Returns the attached tokenizer, if any.
    #[must_use]
    pub fn tokenizer(&self) -> Option<Arc<dyn Tokenizer>> {
        self.tokenizer.clone()
    }

    /// Renders `result` within the configured `max_length`.
    #[must_use]
    pub fn build(&self, result: &RetrievalResult) -> String {
        self.build_with_budget(result, self.config.max_length)
    }

    /// Renders `result` within `max_length` tokens.
    #[must_use]
    pub fn build_with_budget(&self, result: &RetrievalResult, max_length: usize) -> String {
        let mut entries: Vec<(&Document, f32)> = result.iter().collect();
        if self.config.sort_by_relevance {
            entries.sort_by(|a, b| compare_scores(a.1, b.1));
        }

        let separator = if self.config.separate_chunks {
            "\n---\n"
        } else {
            "\n\n"
        };
        let joined = entries
            .into_iter()
            .map(|(document, score)| self.render(document, score))
            .collect::<Vec<_>>()
            .join(separator);

        self.truncate(&joined, max_length)
    }

    /// Token length of `text`: exact with a tokenizer, `words / 0.75` otherwise.
    #[must_use]
    pub fn length(&self, text: &str) -> usize {
        match &self.tokenizer {
            Some(tokenizer) => tokenizer.count_tokens(text),
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            None => (text.split_whitespace().count() as f64 / WORDS_PER_TOKEN).ceil() as usize,
        }
    }

    /// Cuts `text` down to `max_length` tokens with the configured policy.
    #[must_use]
    pub fn truncate(&self, text: &str, max_length: usize) -> String {
        if self.length(text) <= max_length {
            return text.to_string();
        }

        let words = WordBounds::new(text);
        match self.config.truncation {
            Truncation::Head => self.head(text, &words, max_length).to_string(),
            Truncation::Tail => self.tail(text, &words, max_length).to_string(),
            Truncation::Middle if max_length < MIN_MIDDLE_BUDGET => {
                self.head(text, &words, max_length).to_string()
            }
            Truncation::Middle => {
                let half = max_length.saturating_sub(self.length(TRUNCATION_MARKER)) / 2;
                let prefix = self.head(text, &words, half);
                let suffix = self.tail(text, &words, half);
                format!("{prefix}\n{TRUNCATION_MARKER}\n{suffix}")
            }
        }
    }

    fn render(&self, document: &Document, score: f32) -> String {
        let mut rendered = self
            .config
            .template
            .replace("{id}", &document.id)
            .replace("{title}", &document.title)
            .replace("{source}", &document.source)
            .replace("{metadata}", &format_metadata(&document.metadata))
            .replace("{content}", &document.content);

        if self.config.include_metadata && !document.metadata.is_empty() {
            let _ = write!(
                rendered,
                "\nMetadata: {}",
                format_metadata(&document.metadata)
            );
        }
        if self.config.include_scores {
            let _ = write!(rendered, "\nScore: {score:.3}");
        }
        rendered
    }

    /// Longest word-aligned prefix within `budget`.
    fn head<'a>(&self, text: &'a str, words: &WordBounds, budget: usize) -> &'a str {
        // Largest `k` such that the first `k` words fit.
        let (mut lo, mut hi) = (0, words.len());
        while lo < hi {
            let mid = (lo + hi).div_ceil(2);
            if self.length(&text[..words.ends[mid - 1]]) <= budget {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        if lo == 0 { "" } else { &text[..words.ends[lo - 1]] }
    }

    /// Longest word-aligned suffix within `budget`.
    fn tail<'a>(&self, text: &'a str, words: &WordBounds, budget: usize) -> &'a str {
        // Smallest `i` such that the words from `i` on fit.
        let (mut lo, mut hi) = (0, words.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.length(&text[words.starts[mid]..]) <= budget {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        if lo == words.len() {
            ""
        } else {
            &text[words.starts[lo]..]
        }
    }
}

/// Byte offsets of whitespace-delimited words.
struct WordBounds {
    starts: Vec<usize>,
    ends: Vec<usize>,
}

impl WordBounds {
    fn new(text: &str) -> Self {
        let mut starts = Vec::new();
        let mut ends = Vec::new();
        let mut in_word = false;
        for (idx, ch) in text.char_indices() {
            if ch.is_whitespace() {
                if in_word {
                    ends.push(idx);
                    in_word = false;
                }
            } else if !in_word {
                starts.push(idx);
                in_word = true;
            }
        }
        if in_word {
            ends.push(text.len());
        }
        Self { starts, ends }
    }

    fn len(&self) -> usize {
        self.starts.len()
    }
}

fn format_metadata(metadata: &Metadata) -> String {
    metadata
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Query, ScoredDocument};
    use recall_core::WhitespaceTokenizer;

    fn result(entries: &[(&str, &str, f32)]) -> RetrievalResult {
        let hits = entries
            .iter()
            .map(|&(id, content, score)| ScoredDocument {
                document: Document::new(id, content),
                score,
            })
            .collect();
        RetrievalResult::from_hits(Query::new("q"), hits, entries.len())
    }

    fn numbered(count: usize) -> String {
        (0..count).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn tokenized(config: ContextConfig) -> ContextBuilder {
        ContextBuilder::new(config).with_tokenizer(Arc::new(WhitespaceTokenizer))
    }

    #[test]
    fn renders_template_fields() {
        let mut document = Document::new("a", "body").title("Title").source("file.txt");
        document.metadata.insert("lang".into(), "en".into());
        let hits = vec![ScoredDocument { document, score: 0.5 }];
        let result = RetrievalResult::from_hits(Query::new("q"), hits, 1);

        let builder = ContextBuilder::new(
            ContextConfig::builder()
                .template("{id}|{title}|{source}|{metadata}|{content}")
                .build(),
        );
        assert_eq!(builder.build(&result), "a|Title|file.txt|lang=en|body");
    }

    #[test]
    fn sorts_and_joins() {
        let result = result(&[("low", "second", 0.1), ("high", "first", 0.9)]);

        let sorted = ContextBuilder::default().build(&result);
        assert_eq!(sorted, "first\n\nsecond");

        let unsorted = ContextBuilder::new(
            ContextConfig::builder()
                .sort_by_relevance(false)
                .separate_chunks(true)
                .build(),
        )
        .build(&result);
        assert_eq!(unsorted, "second\n---\nfirst");
    }

    #[test]
    fn appends_metadata_and_scores() {
        let mut document = Document::new("a", "body");
        document.metadata.insert("k".into(), "v".into());
        let hits = vec![ScoredDocument { document, score: 0.25 }];
        let result = RetrievalResult::from_hits(Query::new("q"), hits, 1);

        let builder = ContextBuilder::new(
            ContextConfig::builder()
                .include_metadata(true)
                .include_scores(true)
                .build(),
        );
        assert_eq!(builder.build(&result), "body\nMetadata: k=v\nScore: 0.250");
    }

    #[test]
    fn head_and_tail_with_tokenizer() {
        let text = numbered(20);
        let result = result(&[("a", &text, 1.0)]);

        let head = tokenized(ContextConfig::builder().max_length(5).build()).build(&result);
        assert_eq!(head, "w0 w1 w2 w3 w4");

        let tail = tokenized(
            ContextConfig::builder()
                .max_length(5)
                .truncation(Truncation::Tail)
                .build(),
        )
        .build(&result);
        assert_eq!(tail, "w15 w16 w17 w18 w19");
    }

    #[test]
    fn word_estimate_without_tokenizer() {
        let text = numbered(20);
        let builder = ContextBuilder::new(ContextConfig::builder().max_length(8).build());

        assert_eq!(builder.length(&text), 27);
        // Eight tokens hold six words.
        assert_eq!(builder.truncate(&text, 8), "w0 w1 w2 w3 w4 w5");
    }

    #[test]
    fn middle_keeps_both_ends() {
        let text = numbered(300);
        let builder = tokenized(
            ContextConfig::builder()
                .max_length(120)
                .truncation(Truncation::Middle)
                .build(),
        );

        let truncated = builder.truncate(&text, 120);
        assert!(truncated.starts_with("w0 w1"));
        assert!(truncated.ends_with("w298 w299"));
        assert!(truncated.contains(TRUNCATION_MARKER));
        assert!(WhitespaceTokenizer.count_tokens(&truncated) <= 120);
    }

    #[test]
    fn middle_falls_back_to_head_on_small_budget() {
        let text = numbered(300);
        let builder = tokenized(ContextConfig::builder().truncation(Truncation::Middle).build());

        let truncated = builder.truncate(&text, 10);
        assert_eq!(truncated, numbered(10));
    }

    #[test]
    fn fitting_text_is_untouched() {
        let builder = tokenized(ContextConfig::default());
        assert_eq!(builder.truncate("a b c", 3), "a b c");
        assert_eq!(builder.truncate("a b c", 0), "");
    }
}
