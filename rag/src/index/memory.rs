//! In-memory brute-force vector store.

use parking_lot::RwLock;

use crate::error::{RagError, Result};
use crate::similarity::{batch_cosine_similarity, compare_scores};
use crate::types::{Document, Metadata, ScoredDocument};

use super::{SearchHits, VectorStore};

/// Parallel arrays backing the store. `ids[i]`, `vectors[i]` and `documents[i]` describe the
/// same entry.
#[derive(Default)]
struct StoreState {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    documents: Vec<Document>,
    closed: bool,
}

impl StoreState {
    fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|existing| existing == id)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(RagError::Closed("vector store"));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.ids.clear();
        self.vectors.clear();
        self.documents.clear();
    }
}

/// Exact cosine-similarity store for moderate corpora.
///
/// Every search scores all stored vectors in parallel. Lookups by id scan the id list, which is
/// fine for the in-memory, tens-of-thousands scale this store targets.
///
/// # Example
///
/// ```rust
/// use recall_rag::index::{MemoryVectorStore, VectorStore};
/// use recall_rag::Document;
///
/// let store = MemoryVectorStore::new(3);
/// store.add(Document::new("a", "alpha").vector(vec![1.0, 0.0, 0.0])).unwrap();
/// let hits = store.search(&[1.0, 0.0, 0.0], 1).unwrap();
/// assert_eq!(hits[0].document.id, "a");
/// ```
pub struct MemoryVectorStore {
    dimension: usize,
    state: RwLock<StoreState>,
}

impl std::fmt::Debug for MemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryVectorStore")
            .field("dimension", &self.dimension)
            .field("len", &state.ids.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl MemoryVectorStore {
    /// Creates an empty store for vectors of `dimension` components.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: RwLock::new(StoreState::default()),
        }
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }
}

impl VectorStore for MemoryVectorStore {
    fn add(&self, mut document: Document) -> Result<()> {
        let vector = match document.vector.take() {
            Some(vector) if !vector.is_empty() => vector,
            _ => return Err(RagError::EmptyVector(document.id)),
        };
        self.check_dimension(vector.len())?;

        let mut state = self.state.write();
        state.ensure_open()?;

        if let Some(idx) = state.position(&document.id) {
            state.vectors[idx] = vector;
            state.documents[idx] = document;
        } else {
            state.ids.push(document.id.clone());
            state.vectors.push(vector);
            state.documents.push(document);
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Document> {
        let state = self.state.read();
        state.ensure_open()?;

        let idx = state
            .position(id)
            .ok_or_else(|| RagError::NotFound(id.to_string()))?;
        let mut document = state.documents[idx].clone();
        document.vector = Some(state.vectors[idx].clone());
        Ok(document)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.write();
        state.ensure_open()?;

        let idx = state
            .position(id)
            .ok_or_else(|| RagError::NotFound(id.to_string()))?;
        // `remove` rather than `swap_remove`: insertion order is the tie-break for equal scores.
        state.ids.remove(idx);
        state.vectors.remove(idx);
        state.documents.remove(idx);
        Ok(())
    }

    fn search_filtered(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: Option<f32>,
        filters: &Metadata,
    ) -> Result<SearchHits> {
        if top_k == 0 {
            return Err(RagError::InvalidTopK(top_k));
        }
        if let Some(threshold) = threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(RagError::InvalidThreshold(threshold));
            }
        }
        self.check_dimension(query.len())?;

        let state = self.state.read();
        state.ensure_open()?;

        if state.ids.is_empty() {
            return Ok(SearchHits::default());
        }

        let scores = batch_cosine_similarity(query, &state.vectors);
        let mut ranked: Vec<(usize, f32)> = scores
            .into_iter()
            .enumerate()
            .filter(|&(_, score)| threshold.is_none_or(|min| score >= min))
            .filter(|&(idx, _)| {
                filters
                    .iter()
                    .all(|(key, value)| state.documents[idx].metadata.get(key) == Some(value))
            })
            .collect();

        // Stable sort: equal scores stay in insertion order.
        ranked.sort_by(|a, b| compare_scores(a.1, b.1));
        let total_found = ranked.len();
        ranked.truncate(top_k);

        let hits = ranked
            .into_iter()
            .map(|(idx, score)| {
                let mut document = state.documents[idx].clone();
                document.vector = Some(state.vectors[idx].clone());
                ScoredDocument { document, score }
            })
            .collect();

        Ok(SearchHits { hits, total_found })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.state.read().ids.len()
    }

    fn ids(&self) -> Vec<String> {
        self.state.read().ids.clone()
    }

    fn documents(&self) -> Vec<Document> {
        let state = self.state.read();
        state
            .documents
            .iter()
            .zip(&state.vectors)
            .map(|(document, vector)| {
                let mut document = document.clone();
                document.vector = Some(vector.clone());
                document
            })
            .collect()
    }

    fn clear(&self) {
        self.state.write().reset();
    }

    fn close(&self) {
        let mut state = self.state.write();
        if !state.closed {
            state.reset();
            state.closed = true;
        }
    }
}
