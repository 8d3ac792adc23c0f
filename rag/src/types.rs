//! Core types for the retrieval engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use time::OffsetDateTime;

/// Key/value metadata attached to documents and chunks.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key recording which document a stored chunk came from.
pub const DOCUMENT_ID_KEY: &str = "document_id";
/// Metadata key recording the chunk position within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";
/// Metadata key recording the strategy that produced a chunk.
pub const CHUNK_STRATEGY_KEY: &str = "chunk_strategy";

/// A document to be indexed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Caller-assigned unique identifier.
    pub id: String,
    /// Raw text content.
    pub content: String,
    /// Human readable title.
    #[serde(default)]
    pub title: String,
    /// Where the document came from (path, URL, ...).
    #[serde(default)]
    pub source: String,
    /// Arbitrary metadata for filtering/citations.
    #[serde(default)]
    pub metadata: Metadata,
    /// Embedding vector, present once embedded.
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last modification time.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Document {
    /// Creates a new document with empty metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            content: content.into(),
            title: String::new(),
            source: String::new(),
            metadata: Metadata::new(),
            vector: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a new document with metadata.
    #[must_use]
    pub fn with_metadata(
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            metadata,
            ..Self::new(id, content)
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the source.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the embedding vector.
    #[must_use]
    pub fn vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Content size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// A chunk of text derived from exactly one document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier for this chunk (format: `{document_id}_chunk_{index}`).
    pub id: String,
    /// Text content of the chunk.
    pub content: String,
    /// Parent document ID.
    pub document_id: String,
    /// Index of this chunk within the document.
    pub index: usize,
    /// Byte offset of the chunk start in the parent content.
    pub start_pos: usize,
    /// Byte offset one past the chunk end in the parent content.
    pub end_pos: usize,
    /// Token count, exact when a tokenizer was supplied, estimated otherwise.
    pub token_count: usize,
    /// Inherited and chunk-specific metadata.
    pub metadata: Metadata,
    /// Embedding vector, present once embedded.
    pub vector: Option<Vec<f32>>,
}

impl Chunk {
    /// Builds the deterministic identifier for chunk `index` of `document_id`.
    #[must_use]
    pub fn make_id(document_id: &str, index: usize) -> String {
        format!("{document_id}_chunk_{index}")
    }

    /// Converts the chunk into a storable document inheriting `parent`'s title and source.
    #[must_use]
    pub fn into_document(self, parent: &Document) -> Document {
        let mut metadata = self.metadata;
        metadata.insert(DOCUMENT_ID_KEY.into(), self.document_id);
        metadata.insert(CHUNK_INDEX_KEY.into(), self.index.to_string());
        metadata.insert("start_pos".into(), self.start_pos.to_string());
        metadata.insert("end_pos".into(), self.end_pos.to_string());
        metadata.insert("token_count".into(), self.token_count.to_string());
        Document {
            id: self.id,
            content: self.content,
            title: parent.title.clone(),
            source: parent.source.clone(),
            metadata,
            vector: self.vector,
            created_at: parent.created_at,
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

/// A retrieval request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Query text, must not be empty.
    pub text: String,
    /// Maximum number of results, must be positive.
    pub top_k: usize,
    /// Minimum similarity score in `[0, 1]`.
    pub threshold: f32,
    /// Metadata equality filters applied to hits.
    #[serde(default)]
    pub filters: Metadata,
    /// Token budget for context assembled from this query.
    #[serde(default)]
    pub max_tokens: Option<usize>,
    /// Strategy tag; the hybrid retriever runs only the named strategy when it matches one.
    #[serde(default)]
    pub strategy: String,
}

impl Query {
    /// Creates a query with `top_k = 5` and no threshold.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: 5,
            threshold: 0.0,
            filters: Metadata::new(),
            max_tokens: None,
            strategy: String::new(),
        }
    }

    /// Sets the number of results.
    #[must_use]
    pub const fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets the similarity threshold.
    #[must_use]
    pub const fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Adds a metadata equality filter.
    #[must_use]
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Sets the token budget.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the strategy tag.
    #[must_use]
    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    /// Returns `true` when `document` satisfies every filter.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        self.filters
            .iter()
            .all(|(key, value)| document.metadata.get(key) == Some(value))
    }
}

/// A document paired with its similarity score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// The matching document.
    pub document: Document,
    /// Similarity score (higher is better, in `[-1, 1]` for cosine).
    pub score: f32,
}

/// Outcome of a retrieval.
///
/// `documents` and `scores` are index-aligned and sorted by descending score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The query that produced this result.
    pub query: Query,
    /// Matching documents.
    pub documents: Vec<Document>,
    /// Scores, aligned with `documents`.
    pub scores: Vec<f32>,
    /// Number of matches before truncation to `top_k`.
    pub total_found: usize,
    /// Wall time of the whole retrieval.
    pub query_time: Duration,
    /// Time spent embedding the query.
    pub embedding_time: Duration,
    /// Time spent searching.
    pub search_time: Duration,
}

impl RetrievalResult {
    /// Builds a result from scored hits, keeping their order.
    #[must_use]
    pub fn from_hits(query: Query, hits: Vec<ScoredDocument>, total_found: usize) -> Self {
        let (documents, scores) = hits.into_iter().map(|hit| (hit.document, hit.score)).unzip();
        Self {
            query,
            documents,
            scores,
            total_found,
            query_time: Duration::ZERO,
            embedding_time: Duration::ZERO,
            search_time: Duration::ZERO,
        }
    }

    /// Number of returned documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns `true` when nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Iterates over `(document, score)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Document, f32)> {
        self.documents.iter().zip(self.scores.iter().copied())
    }
}

/// Aggregate counters reported by a retriever.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    /// Documents currently indexed.
    pub total_documents: usize,
    /// Chunks currently stored.
    pub total_chunks: usize,
    /// Retrievals served.
    pub total_queries: u64,
    /// Mean wall time per retrieval.
    pub average_query_time: Duration,
    /// Embedding cache hit rate in `[0, 1]`.
    pub cache_hit_rate: f64,
    /// Last time the index changed.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}
