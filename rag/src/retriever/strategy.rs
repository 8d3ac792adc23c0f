//! Scoring strategies combined by the hybrid retriever.

use std::collections::BTreeSet;

use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;
use crate::index::VectorStore;
use crate::similarity::compare_scores;
use crate::types::{Query, ScoredDocument};

/// One way of ranking stored documents for a query.
///
/// Strategies run on blocking worker threads, so `search` is synchronous.
pub trait SearchStrategy: Send + Sync {
    /// Tag matched against [`Query::strategy`].
    fn name(&self) -> &str;

    /// Returns at most `query.top_k` hits sorted by descending score.
    ///
    /// `query_vector` is the embedding of `query.text`; strategies that do not need it ignore it.
    fn search(
        &self,
        store: &dyn VectorStore,
        query: &Query,
        query_vector: &[f32],
    ) -> Result<Vec<ScoredDocument>>;
}

/// Cosine similarity against the store's vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorSimilarity;

impl SearchStrategy for VectorSimilarity {
    fn name(&self) -> &str {
        "vector"
    }

    fn search(
        &self,
        store: &dyn VectorStore,
        query: &Query,
        query_vector: &[f32],
    ) -> Result<Vec<ScoredDocument>> {
        Ok(store
            .search_filtered(query_vector, query.top_k, Some(query.threshold), &query.filters)?
            .hits)
    }
}

/// Share of query terms found in each document.
///
/// Terms are case-folded words longer than two characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordOverlap;

fn terms(text: &str) -> BTreeSet<String> {
    text.unicode_words()
        .filter(|word| word.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

impl SearchStrategy for KeywordOverlap {
    fn name(&self) -> &str {
        "keyword"
    }

    #[allow(clippy::cast_precision_loss)]
    fn search(
        &self,
        store: &dyn VectorStore,
        query: &Query,
        _query_vector: &[f32],
    ) -> Result<Vec<ScoredDocument>> {
        let wanted = terms(&query.text);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<ScoredDocument> = store
            .documents()
            .into_iter()
            .filter(|document| query.matches(document))
            .filter_map(|document| {
                let present = terms(&document.content);
                let shared = wanted.iter().filter(|term| present.contains(*term)).count();
                let score = shared as f32 / wanted.len() as f32;
                (score > 0.0 && score >= query.threshold)
                    .then_some(ScoredDocument { document, score })
            })
            .collect();

        hits.sort_by(|a, b| compare_scores(a.score, b.score));
        hits.truncate(query.top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryVectorStore;
    use crate::types::Document;

    fn store() -> MemoryVectorStore {
        let store = MemoryVectorStore::new(2);
        for (id, content, vector) in [
            ("a", "Rust ownership and borrowing", vec![1.0, 0.0]),
            ("b", "Borrowing books from a library", vec![0.0, 1.0]),
            ("c", "Nothing relevant", vec![0.7, 0.7]),
        ] {
            store.add(Document::new(id, content).vector(vector)).unwrap();
        }
        store
    }

    #[test]
    fn keyword_scores_term_share() {
        let hits = KeywordOverlap
            .search(&store(), &Query::new("rust borrowing"), &[])
            .unwrap();

        let ranked: Vec<_> = hits
            .iter()
            .map(|hit| (hit.document.id.as_str(), hit.score))
            .collect();
        assert_eq!(ranked, [("a", 1.0), ("b", 0.5)]);
    }

    #[test]
    fn keyword_respects_filters_and_threshold() {
        let store = store();
        let query = Query::new("rust borrowing").threshold(0.6);
        let hits = KeywordOverlap.search(&store, &query, &[]).unwrap();
        assert_eq!(hits.len(), 1);

        let query = Query::new("rust borrowing").filter("lang", "en");
        assert!(KeywordOverlap.search(&store, &query, &[]).unwrap().is_empty());

        // Only short words: nothing to match on.
        assert!(KeywordOverlap.search(&store, &Query::new("a b"), &[]).unwrap().is_empty());
    }

    #[test]
    fn vector_delegates_to_store() {
        let hits = VectorSimilarity
            .search(&store(), &Query::new("q").top_k(1), &[1.0, 0.0])
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "a");
    }
}
