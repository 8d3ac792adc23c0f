//! Retrieval engine for agent prompts.
//!
//! `recall-rag` turns documents into retrievable context for any
//! [`EmbeddingModel`](recall_core::EmbeddingModel):
//!
//! - [`chunking`] splits documents into overlapping, position-tracked chunks.
//! - [`cache`] keeps an LRU + TTL cache of embeddings keyed by a content [`fingerprint`](cache::fingerprint),
//!   optionally persisted to disk.
//! - [`index`] stores chunk vectors and ranks them by cosine similarity.
//! - [`retriever`] ties those together: [`BasicRetriever`] searches one store, [`HybridRetriever`]
//!   runs several [`SearchStrategy`]s concurrently and combines their scores.
//! - [`context`] renders a retrieval result into one bounded prompt string.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use recall_rag::{
//!     BasicRetriever, ChunkStrategy, ChunkingOptions, Document, EmbeddingCache,
//!     MemoryVectorStore, Retriever,
//! };
//! use recall_rag::config::{CacheConfig, RetrieverConfig};
//!
//! # async fn example(model: impl recall_core::EmbeddingModel) -> recall_rag::Result<()> {
//! let store = Arc::new(MemoryVectorStore::new(model.dim()));
//! let cache = Arc::new(EmbeddingCache::new(
//!     CacheConfig::builder().persist_path("cache/embeddings.json").build(),
//! )?);
//! let config = RetrieverConfig::builder()
//!     .chunking(ChunkingOptions::new(ChunkStrategy::Sentences).max_chunk_size(400))
//!     .build();
//! let retriever = BasicRetriever::new(model, store, cache, config)?;
//!
//! retriever.add_document(Document::new("guide", "Rust has ownership. It has no GC.")).await?;
//! let context = retriever.retrieve_context(&retriever.query("how is memory managed?")).await?;
//! println!("{context}");
//!
//! retriever.close()?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chunking;
pub mod config;
pub mod context;
pub mod embedder;
pub mod error;
pub mod index;
pub mod retriever;
pub mod similarity;
pub mod types;

pub use cache::{CacheEntry, CacheStats, EmbeddingCache};
pub use chunking::{ChunkStrategy, Chunker, ChunkingOptions, TextChunker};
pub use config::{CacheConfig, ContextConfig, RetrieverConfig, Truncation};
pub use context::ContextBuilder;
pub use embedder::CachedEmbedder;
pub use error::{ErrorKind, RagError, Result};
pub use index::{MemoryVectorStore, SearchHits, VectorStore};
pub use retriever::{
    BasicRetriever, HybridRetriever, KeywordOverlap, Retriever, SearchStrategy, VectorSimilarity,
};
pub use types::{
    Chunk, Document, Metadata, Query, RetrievalResult, RetrievalStats, ScoredDocument,
};

pub use recall_core::{EmbeddingModel, Tokenizer, WhitespaceTokenizer};
