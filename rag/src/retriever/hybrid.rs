//! Weighted combination of several search strategies.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use recall_core::EmbeddingModel;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{RagError, Result};
use crate::similarity::compare_scores;
use crate::types::{Document, Query, RetrievalResult, RetrievalStats, ScoredDocument};

use super::{BasicRetriever, HYBRID_TAG, Retriever, SearchStrategy, validate_query};

/// Runs strategies concurrently over one store and sums their weighted scores.
///
/// A document's final score is `Σ weight_i × score_i` over the strategies that returned it.
/// Documents are ordered by descending score, ties broken by id. Indexing, deletion and
/// statistics delegate to the wrapped [`BasicRetriever`].
pub struct HybridRetriever<M> {
    basic: BasicRetriever<M>,
    strategies: Vec<Arc<dyn SearchStrategy>>,
    weights: Vec<f32>,
}

impl<M> std::fmt::Debug for HybridRetriever<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("HybridRetriever")
            .field("basic", &self.basic)
            .field("strategies", &names)
            .field("weights", &self.weights)
            .finish()
    }
}

impl<M: EmbeddingModel> HybridRetriever<M> {
    /// Combines `strategies` with the matching `weights`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] when the lengths differ or a weight is not finite.
    pub fn new(
        basic: BasicRetriever<M>,
        strategies: Vec<Arc<dyn SearchStrategy>>,
        weights: Vec<f32>,
    ) -> Result<Self> {
        if strategies.len() != weights.len() {
            return Err(RagError::InvalidConfig(format!(
                "{} strategies but {} weights",
                strategies.len(),
                weights.len()
            )));
        }
        if let Some(weight) = weights.iter().find(|w| !w.is_finite()) {
            return Err(RagError::InvalidConfig(format!("weight {weight} is not finite")));
        }
        Ok(Self {
            basic,
            strategies,
            weights,
        })
    }

    /// Returns the wrapped retriever.
    pub const fn basic(&self) -> &BasicRetriever<M> {
        &self.basic
    }

    /// Strategies selected by `tag`: the named one, or all of them.
    fn selected(&self, tag: &str) -> Vec<(Arc<dyn SearchStrategy>, f32)> {
        let all = self
            .strategies
            .iter()
            .cloned()
            .zip(self.weights.iter().copied());
        if tag.is_empty() || tag == HYBRID_TAG {
            return all.collect();
        }
        let named: Vec<_> = all.clone().filter(|(s, _)| s.name() == tag).collect();
        if named.is_empty() {
            debug!(tag, "unknown strategy tag, running all strategies");
            all.collect()
        } else {
            named
        }
    }

    async fn combine(&self, query: &Query) -> Result<RetrievalResult> {
        self.basic.ensure_open()?;
        validate_query(query)?;

        let started = Instant::now();
        let vector: Arc<[f32]> = self.basic.embedder().embed(&query.text).await?.into();
        let embedding_time = started.elapsed();

        let search_started = Instant::now();
        let mut tasks = JoinSet::new();
        for (strategy, weight) in self.selected(&query.strategy) {
            let store = Arc::clone(self.basic.store());
            let query = query.clone();
            let vector = Arc::clone(&vector);
            tasks.spawn_blocking(move || {
                let outcome = strategy.search(&*store, &query, &vector);
                (strategy.name().to_string(), weight, outcome)
            });
        }

        let mut combined: BTreeMap<String, ScoredDocument> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (name, weight, outcome) = joined.map_err(|e| RagError::Task(e.to_string()))?;
            let hits = match outcome {
                Ok(hits) => hits,
                Err(err) => {
                    tasks.abort_all();
                    warn!(strategy = %name, error = %err, "strategy failed");
                    return Err(err
                        .context("hybrid_retrieve")
                        .with_detail("strategy", name));
                }
            };
            for hit in hits {
                let weighted = weight * hit.score;
                combined
                    .entry(hit.document.id.clone())
                    .and_modify(|entry| entry.score += weighted)
                    .or_insert(ScoredDocument {
                        document: hit.document,
                        score: weighted,
                    });
            }
        }
        let search_time = search_started.elapsed();

        let total_found = combined.len();
        // BTreeMap yields ids in order, and the sort is stable, so ties stay ordered by id.
        let mut hits: Vec<ScoredDocument> = combined.into_values().collect();
        hits.sort_by(|a, b| compare_scores(a.score, b.score));
        hits.truncate(query.top_k);

        let mut result = RetrievalResult::from_hits(query.clone(), hits, total_found);
        result.embedding_time = embedding_time;
        result.search_time = search_time;
        result.query_time = started.elapsed();
        self.basic.record_query(result.query_time);
        Ok(result)
    }
}

impl<M: EmbeddingModel> Retriever for HybridRetriever<M> {
    async fn retrieve(&self, query: &Query) -> Result<RetrievalResult> {
        if self.strategies.is_empty() {
            return self.basic.retrieve(query).await;
        }
        self.combine(query)
            .await
            .map_err(|e| e.context("hybrid_retrieve"))
    }

    async fn add_document(&self, document: Document) -> Result<usize> {
        self.basic.add_document(document).await
    }

    async fn update_document(&self, document: Document) -> Result<usize> {
        self.basic.update_document(document).await
    }

    fn delete_document(&self, id: &str) -> Result<()> {
        self.basic.delete_document(id)
    }

    fn get_document(&self, id: &str) -> Result<Document> {
        self.basic.get_document(id)
    }

    fn get_stats(&self) -> RetrievalStats {
        self.basic.get_stats()
    }

    fn close(&self) -> Result<()> {
        self.basic.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddingCache;
    use crate::config::{CacheConfig, RetrieverConfig};
    use crate::index::{MemoryVectorStore, VectorStore};
    use crate::retriever::test_support::{KeywordEmbedder, VOCABULARY};
    use crate::retriever::{KeywordOverlap, VectorSimilarity};

    struct Broken;

    impl SearchStrategy for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn search(
            &self,
            _store: &dyn VectorStore,
            _query: &Query,
            _query_vector: &[f32],
        ) -> Result<Vec<ScoredDocument>> {
            Err(RagError::Serialization("index corrupted".into()))
        }
    }

    /// Scores every document 0.5, regardless of the query.
    struct Flat;

    impl SearchStrategy for Flat {
        fn name(&self) -> &str {
            "flat"
        }

        fn search(
            &self,
            store: &dyn VectorStore,
            query: &Query,
            _query_vector: &[f32],
        ) -> Result<Vec<ScoredDocument>> {
            let mut hits: Vec<_> = store
                .documents()
                .into_iter()
                .map(|document| ScoredDocument { document, score: 0.5 })
                .collect();
            hits.truncate(query.top_k);
            Ok(hits)
        }
    }

    async fn basic() -> BasicRetriever<KeywordEmbedder> {
        let store = Arc::new(MemoryVectorStore::new(VOCABULARY.len() + 1));
        let cache = Arc::new(EmbeddingCache::new(CacheConfig::default()).unwrap());
        let retriever =
            BasicRetriever::new(KeywordEmbedder, store, cache, RetrieverConfig::default()).unwrap();
        retriever
            .add_documents(vec![
                Document::new("b", "Music theory for beginners"),
                Document::new("a", "Rust for systems programming"),
                Document::new("c", "Cooking with rust colored spices"),
            ])
            .await
            .unwrap();
        retriever
    }

    fn strategies(list: &[Arc<dyn SearchStrategy>]) -> Vec<Arc<dyn SearchStrategy>> {
        list.to_vec()
    }

    #[tokio::test]
    async fn weights_sum_scores() {
        let hybrid = HybridRetriever::new(
            basic().await,
            strategies(&[Arc::new(VectorSimilarity), Arc::new(KeywordOverlap)]),
            vec![0.5, 0.5],
        )
        .unwrap();

        let result = hybrid
            .retrieve(&Query::new("rust systems").top_k(2))
            .await
            .unwrap();

        assert_eq!(result.documents[0].id, "a_chunk_0");
        assert_eq!(result.len(), 2);
        assert!(result.scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(hybrid.get_stats().total_queries, 1);
    }

    #[tokio::test]
    async fn ties_break_by_id() {
        let hybrid =
            HybridRetriever::new(basic().await, strategies(&[Arc::new(Flat)]), vec![1.0]).unwrap();

        let result = hybrid.retrieve(&Query::new("anything")).await.unwrap();
        let ids: Vec<_> = result.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a_chunk_0", "b_chunk_0", "c_chunk_0"]);
        assert!(result.scores.iter().all(|s| (s - 0.5).abs() < f32::EPSILON));
    }

    #[tokio::test]
    async fn strategy_tag_selects_one() {
        let hybrid = HybridRetriever::new(
            basic().await,
            strategies(&[Arc::new(Flat), Arc::new(KeywordOverlap)]),
            vec![1.0, 1.0],
        )
        .unwrap();

        let keyword = hybrid
            .retrieve(&Query::new("music").strategy("keyword"))
            .await
            .unwrap();
        assert_eq!(keyword.len(), 1);
        assert!((keyword.scores[0] - 1.0).abs() < f32::EPSILON);

        // Unknown tags fall back to every strategy.
        let all = hybrid
            .retrieve(&Query::new("music").strategy("missing"))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!((all.scores[0] - 1.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn failing_strategy_fails_retrieval() {
        let hybrid = HybridRetriever::new(
            basic().await,
            strategies(&[Arc::new(VectorSimilarity), Arc::new(Broken)]),
            vec![1.0, 1.0],
        )
        .unwrap();

        let err = hybrid.retrieve(&Query::new("rust")).await.unwrap_err();
        assert_eq!(err.operation(), Some("hybrid_retrieve"));
        assert_eq!(
            err.details()
                .and_then(|d| d.get("strategy"))
                .map(String::as_str),
            Some("broken")
        );
        assert!(matches!(err.root(), RagError::Serialization(_)));
    }

    #[tokio::test]
    async fn no_strategies_falls_back_to_basic() {
        let hybrid = HybridRetriever::new(basic().await, Vec::new(), Vec::new()).unwrap();
        let result = hybrid.retrieve(&Query::new("music").top_k(1)).await.unwrap();
        assert_eq!(result.documents[0].id, "b_chunk_0");
    }

    #[tokio::test]
    async fn mismatched_weights_rejected() {
        let err = HybridRetriever::new(
            basic().await,
            strategies(&[Arc::new(VectorSimilarity)]),
            vec![0.5, 0.5],
        )
        .unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));

        let err = HybridRetriever::new(
            basic().await,
            strategies(&[Arc::new(VectorSimilarity)]),
            vec![f32::NAN],
        )
        .unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));
    }
}
