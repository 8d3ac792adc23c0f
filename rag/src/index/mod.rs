//! Vector store implementations.
//!
//! This module provides the [`VectorStore`] trait and the [`MemoryVectorStore`]
//! implementation, an exact brute-force index kept entirely in memory.

mod memory;

pub use memory::MemoryVectorStore;

use crate::error::Result;
use crate::types::{Document, Metadata, ScoredDocument};

/// Ranked hits plus the number of matches before truncation.
#[derive(Clone, Debug, Default)]
pub struct SearchHits {
    /// Hits sorted by descending score, at most `top_k` long.
    pub hits: Vec<ScoredDocument>,
    /// Number of documents that passed the threshold and filters.
    pub total_found: usize,
}

/// Trait for vector store implementations.
///
/// A vector store holds documents keyed by id, each with a fixed-dimension vector, and ranks
/// them by similarity to a query vector.
pub trait VectorStore: Send + Sync {
    /// Inserts a document, or replaces the one with the same id in place.
    ///
    /// Fails when the document has no vector or its length differs from [`dimension`](Self::dimension).
    fn add(&self, document: Document) -> Result<()>;

    /// Returns a copy of the document with `id`.
    fn get(&self, id: &str) -> Result<Document>;

    /// Removes the document with `id`.
    fn delete(&self, id: &str) -> Result<()>;

    /// Ranks stored documents against `query`.
    ///
    /// `threshold` of `None` keeps every score, including negative ones. `filters` are
    /// metadata equality constraints applied before truncation to `top_k`.
    fn search_filtered(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: Option<f32>,
        filters: &Metadata,
    ) -> Result<SearchHits>;

    /// Returns the `top_k` most similar documents.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        Ok(self
            .search_filtered(query, top_k, None, &Metadata::new())?
            .hits)
    }

    /// Returns the `top_k` most similar documents scoring at least `threshold`.
    fn search_with_threshold(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredDocument>> {
        Ok(self
            .search_filtered(query, top_k, Some(threshold), &Metadata::new())?
            .hits)
    }

    /// Returns the vector dimension.
    fn dimension(&self) -> usize;

    /// Returns the number of stored documents.
    fn len(&self) -> usize;

    /// Returns `true` if the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns stored ids in insertion order.
    fn ids(&self) -> Vec<String>;

    /// Returns a snapshot of all stored documents in insertion order.
    fn documents(&self) -> Vec<Document>;

    /// Removes every document.
    fn clear(&self);

    /// Releases all state. Later calls fail with [`RagError::Closed`](crate::RagError::Closed).
    ///
    /// Closing twice is a no-op.
    fn close(&self);
}
