#![no_std]
//! # recall
//!
//! Façade crate that re-exports the [`recall_core`] traits and, with the `rag` feature, the
//! [`recall_rag`] retrieval engine. Pull this crate into an agent to chunk documents, cache their
//! embeddings, search them and assemble bounded prompt context.
//!
//! ## What's inside?
//!
//! - [`EmbeddingModel`] and [`Tokenizer`], the two collaborators the engine is generic over.
//! - [`WhitespaceTokenizer`], an approximate tokenizer used when no real one is supplied.
//! - `rag` (feature): chunkers, the embedding cache, vector stores, retrievers and the context
//!   builder.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use recall::rag::{BasicRetriever, Document, EmbeddingCache, MemoryVectorStore, Retriever};
//! use recall::rag::config::{CacheConfig, RetrieverConfig};
//!
//! async fn demo(model: impl recall::EmbeddingModel) -> recall::rag::Result<String> {
//!     let store = Arc::new(MemoryVectorStore::new(model.dim()));
//!     let cache = Arc::new(EmbeddingCache::new(CacheConfig::default())?);
//!     let retriever = BasicRetriever::new(model, store, cache, RetrieverConfig::default())?;
//!
//!     retriever.add_document(Document::new("osaka", "Osaka is known for takoyaki.")).await?;
//!     retriever.retrieve_context(&retriever.query("food in Osaka")).await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`recall_core::embedding`]: convert text to vectors.
//! - [`recall_core::tokenizer`]: count and truncate text by tokens.

extern crate alloc;

pub use recall_core::*;

/// The retrieval engine.
#[cfg(feature = "rag")]
#[doc(inline)]
pub use recall_rag as rag;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_tokenizer_is_reexported() {
        assert_eq!(WhitespaceTokenizer.count_tokens("three small words"), 3);
    }

    #[test]
    fn embedding_trait_is_reexported() {
        struct Constant;

        impl EmbeddingModel for Constant {
            fn dim(&self) -> usize {
                2
            }

            async fn embed(&self, _text: &str) -> Result<alloc::vec::Vec<f32>> {
                Ok(alloc::vec![0.5, 0.5])
            }
        }

        let vector = tokio_test::block_on(Constant.embed("anything")).unwrap();
        assert_eq!(vector.len(), Constant.dim());
    }
}
