//! # recall-core
//!
//! `recall-core` hosts the `no_std` trait APIs that the retrieval engine consumes. Embedding
//! providers and tokenizers live outside the engine; they only need to implement the traits in
//! this crate to plug into [`recall-rag`](https://docs.rs/recall-rag).
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │   Your Agent    │───▶│   recall-rag     │───▶│  recall-core    │
//! │                 │    │                  │    │                 │
//! │ - Chat loop     │    │ - Chunker        │    │ - EmbeddingModel│
//! │ - Tool calls    │    │ - Vector store   │    │ - Tokenizer     │
//! │ - Prompting     │    │ - Retrievers     │    │                 │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! ## Capabilities
//!
//! | Capability | Trait | Description |
//! |------------|-------|-------------|
//! | **Embeddings** | [`EmbeddingModel`] | Convert text to vectors for semantic search |
//! | **Tokenization** | [`Tokenizer`] | Count, split and truncate text by tokens |
//!
//! ### Semantic Search with Embeddings
//!
//! ```rust
//! use recall_core::EmbeddingModel;
//!
//! async fn embed_query(model: impl EmbeddingModel, query: &str) -> recall_core::Result<Vec<f32>> {
//!     let query_embedding = model.embed(query).await?;
//!     assert_eq!(query_embedding.len(), model.dim());
//!     Ok(query_embedding)
//! }
//! ```
//!
//! ## Modules
//!
//! - [`embedding`]: turn text into dense vectors.
//! - [`tokenizer`]: pluggable approximate token counting.

#![no_std]
extern crate alloc;

/// Text embeddings.
pub mod embedding;
/// Token counting and truncation.
///
/// Contains the [`Tokenizer`] trait and the [`WhitespaceTokenizer`] fallback.
pub mod tokenizer;

use alloc::string::String;

#[doc(inline)]
pub use embedding::EmbeddingModel;
#[doc(inline)]
pub use tokenizer::{Tokenizer, WhitespaceTokenizer};

/// Result type used throughout the crate.
///
/// Type alias for [`anyhow::Result<T>`](anyhow::Result) with [`String`] as default success type.
pub type Result<T = String> = anyhow::Result<T>;

pub use anyhow::Error;
