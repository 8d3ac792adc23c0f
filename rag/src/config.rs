//! Configuration for the retrieval engine.
//!
//! Each component takes an explicit config struct. Every struct has sensible defaults and a
//! consuming builder.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::chunking::ChunkingOptions;

/// Configuration for an [`EmbeddingCache`](crate::cache::EmbeddingCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction.
    pub max_size: usize,
    /// Entry lifetime. `None` keeps entries until evicted.
    pub ttl: Option<Duration>,
    /// Snapshot file loaded on construction and written on close.
    pub persist_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl: None,
            persist_path: None,
        }
    }
}

impl CacheConfig {
    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

/// Builder for [`CacheConfig`].
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Sets the maximum number of entries.
    #[must_use]
    pub const fn max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = max_size;
        self
    }

    /// Sets the entry lifetime.
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = Some(ttl);
        self
    }

    /// Enables persistence at `path`.
    #[must_use]
    pub fn persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.persist_path = Some(path.into());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> CacheConfig {
        self.config
    }
}

/// Configuration for a retriever.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverConfig {
    /// `top_k` used by [`Query`](crate::Query)s built through the retriever.
    pub default_top_k: usize,
    /// Threshold used by [`Query`](crate::Query)s built through the retriever.
    pub default_threshold: f32,
    /// Largest accepted document, in bytes.
    pub max_document_size: usize,
    /// Chunking applied on add. `None` stores each document as a single chunk.
    pub chunking: Option<ChunkingOptions>,
    /// Deadline for each embedding call.
    pub embed_timeout: Option<Duration>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            default_threshold: 0.0,
            max_document_size: 1024 * 1024,
            chunking: None,
            embed_timeout: None,
        }
    }
}

impl RetrieverConfig {
    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> RetrieverConfigBuilder {
        RetrieverConfigBuilder::default()
    }
}

/// Builder for [`RetrieverConfig`].
#[derive(Debug, Default)]
pub struct RetrieverConfigBuilder {
    config: RetrieverConfig,
}

impl RetrieverConfigBuilder {
    /// Sets the default number of results.
    #[must_use]
    pub const fn default_top_k(mut self, k: usize) -> Self {
        self.config.default_top_k = k;
        self
    }

    /// Sets the default similarity threshold.
    #[must_use]
    pub const fn default_threshold(mut self, threshold: f32) -> Self {
        self.config.default_threshold = threshold;
        self
    }

    /// Sets the maximum document size in bytes.
    #[must_use]
    pub const fn max_document_size(mut self, bytes: usize) -> Self {
        self.config.max_document_size = bytes;
        self
    }

    /// Enables chunking on add.
    #[must_use]
    pub fn chunking(mut self, options: ChunkingOptions) -> Self {
        self.config.chunking = Some(options);
        self
    }

    /// Bounds every embedding call.
    #[must_use]
    pub const fn embed_timeout(mut self, timeout: Duration) -> Self {
        self.config.embed_timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> RetrieverConfig {
        self.config
    }
}

/// How an oversized context is cut down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    /// Keep the beginning.
    #[default]
    Head,
    /// Keep the end.
    Tail,
    /// Keep both ends around a marker.
    Middle,
}

/// Default per-document template.
pub const DEFAULT_TEMPLATE: &str = "{content}";

/// Configuration for a [`ContextBuilder`](crate::context::ContextBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Budget in tokens (estimated from words without a tokenizer).
    pub max_length: usize,
    /// Per-document template with `{id}`, `{content}`, `{title}`, `{source}` and `{metadata}`
    /// placeholders.
    pub template: String,
    /// Append a metadata line after each document.
    pub include_metadata: bool,
    /// Append a score line after each document.
    pub include_scores: bool,
    /// Order documents by descending score before rendering.
    pub sort_by_relevance: bool,
    /// Join with a `---` rule instead of a blank line.
    pub separate_chunks: bool,
    /// Policy applied when the budget is exceeded.
    pub truncation: Truncation,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_length: 4000,
            template: DEFAULT_TEMPLATE.to_string(),
            include_metadata: false,
            include_scores: false,
            sort_by_relevance: true,
            separate_chunks: false,
            truncation: Truncation::Head,
        }
    }
}

impl ContextConfig {
    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> ContextConfigBuilder {
        ContextConfigBuilder::default()
    }
}

/// Builder for [`ContextConfig`].
#[derive(Debug, Default)]
pub struct ContextConfigBuilder {
    config: ContextConfig,
}

impl ContextConfigBuilder {
    /// Sets the token budget.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.config.max_length = max_length;
        self
    }

    /// Sets the per-document template.
    #[must_use]
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.config.template = template.into();
        self
    }

    /// Appends metadata lines.
    #[must_use]
    pub const fn include_metadata(mut self, enabled: bool) -> Self {
        self.config.include_metadata = enabled;
        self
    }

    /// Appends score lines.
    #[must_use]
    pub const fn include_scores(mut self, enabled: bool) -> Self {
        self.config.include_scores = enabled;
        self
    }

    /// Sorts by score before rendering.
    #[must_use]
    pub const fn sort_by_relevance(mut self, enabled: bool) -> Self {
        self.config.sort_by_relevance = enabled;
        self
    }

    /// Separates documents with a `---` rule.
    #[must_use]
    pub const fn separate_chunks(mut self, enabled: bool) -> Self {
        self.config.separate_chunks = enabled;
        self
    }

    /// Sets the truncation policy.
    #[must_use]
    pub const fn truncation(mut self, truncation: Truncation) -> Self {
        self.config.truncation = truncation;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ContextConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cache = CacheConfig::default();
        assert_eq!(cache.max_size, 1000);
        assert!(cache.ttl.is_none());

        let retriever = RetrieverConfig::default();
        assert_eq!(retriever.default_top_k, 5);
        assert_eq!(retriever.max_document_size, 1024 * 1024);

        let context = ContextConfig::default();
        assert_eq!(context.max_length, 4000);
        assert_eq!(context.truncation, Truncation::Head);
    }

    #[test]
    fn builders_override_defaults() {
        let cache = CacheConfig::builder()
            .max_size(10)
            .ttl(Duration::from_secs(60))
            .persist_path("/tmp/cache.json")
            .build();
        assert_eq!(cache.max_size, 10);
        assert_eq!(cache.ttl, Some(Duration::from_secs(60)));
        assert_eq!(cache.persist_path, Some(PathBuf::from("/tmp/cache.json")));

        let retriever = RetrieverConfig::builder()
            .default_top_k(3)
            .default_threshold(0.2)
            .max_document_size(64)
            .embed_timeout(Duration::from_millis(500))
            .build();
        assert_eq!(retriever.default_top_k, 3);
        assert_eq!(retriever.max_document_size, 64);
        assert_eq!(retriever.embed_timeout, Some(Duration::from_millis(500)));

        let context = ContextConfig::builder()
            .max_length(100)
            .truncation(Truncation::Middle)
            .separate_chunks(true)
            .build();
        assert_eq!(context.max_length, 100);
        assert!(context.separate_chunks);
    }

    #[test]
    fn truncation_tags() {
        let parsed: Truncation = serde_json::from_str("\"middle\"").unwrap();
        assert_eq!(parsed, Truncation::Middle);
    }
}
