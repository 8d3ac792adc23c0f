//! Retrieval orchestration.
//!
//! [`BasicRetriever`] validates a query, embeds it through the cache, and searches the vector
//! store. [`HybridRetriever`] runs several [`SearchStrategy`]s concurrently over the same store
//! and combines their scores by weight.

mod basic;
mod hybrid;
mod strategy;

pub use basic::BasicRetriever;
pub use hybrid::HybridRetriever;
pub use strategy::{KeywordOverlap, SearchStrategy, VectorSimilarity};

use std::future::Future;

use crate::error::{RagError, Result};
use crate::types::{Document, Query, RetrievalResult, RetrievalStats};

/// Strategy tag that runs every configured strategy.
pub const HYBRID_TAG: &str = "hybrid";

/// Operations the surrounding agent calls.
///
/// Implementations are safe to share across tasks; the store and cache synchronize internally.
pub trait Retriever: Send + Sync {
    /// Returns the documents most relevant to `query`.
    fn retrieve(&self, query: &Query) -> impl Future<Output = Result<RetrievalResult>> + Send;

    /// Chunks, embeds and stores `document`. Returns the number of chunks stored.
    fn add_document(&self, document: Document) -> impl Future<Output = Result<usize>> + Send;

    /// Adds documents in order, stopping at the first error. Returns the number of chunks stored.
    fn add_documents(
        &self,
        documents: Vec<Document>,
    ) -> impl Future<Output = Result<usize>> + Send {
        async move {
            let mut stored = 0;
            for document in documents {
                let id = document.id.clone();
                stored += self
                    .add_document(document)
                    .await
                    .map_err(|e| e.context("add_documents").with_detail("document_id", id))?;
            }
            Ok(stored)
        }
    }

    /// Replaces `document`: deletes the old version, then adds the new one.
    fn update_document(&self, document: Document) -> impl Future<Output = Result<usize>> + Send;

    /// Deletes a document (all of its chunks) or a single chunk.
    fn delete_document(&self, id: &str) -> Result<()>;

    /// Returns the stored entry with `id`.
    fn get_document(&self, id: &str) -> Result<Document>;

    /// Returns aggregate counters.
    fn get_stats(&self) -> RetrievalStats;

    /// Releases the store and persists the cache. Closing twice is a no-op.
    fn close(&self) -> Result<()>;
}

/// Checks the query invariants shared by every retriever.
pub(crate) fn validate_query(query: &Query) -> Result<()> {
    if query.text.trim().is_empty() {
        return Err(RagError::QueryEmpty);
    }
    if query.top_k == 0 {
        return Err(RagError::InvalidTopK(query.top_k));
    }
    if !(0.0..=1.0).contains(&query.threshold) {
        return Err(RagError::InvalidThreshold(query.threshold));
    }
    Ok(())
}
