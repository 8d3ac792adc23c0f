//! Cache-backed embedding.
//!
//! [`CachedEmbedder`] sits between the retrievers and an [`EmbeddingModel`]. Every text is
//! looked up by [`fingerprint`] first; only misses reach the model. The cache lock is never held
//! while the model runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use recall_core::EmbeddingModel;
use tracing::debug;

use crate::cache::{CacheStats, EmbeddingCache, fingerprint};
use crate::error::{RagError, Result};
use crate::types::Metadata;

/// Wraps an [`EmbeddingModel`] with an [`EmbeddingCache`] and an optional deadline.
#[derive(Debug)]
pub struct CachedEmbedder<M> {
    model: M,
    cache: Arc<EmbeddingCache>,
    timeout: Option<Duration>,
}

impl<M: EmbeddingModel> CachedEmbedder<M> {
    /// Creates an embedder backed by `cache`.
    pub const fn new(model: M, cache: Arc<EmbeddingCache>) -> Self {
        Self {
            model,
            cache,
            timeout: None,
        }
    }

    /// Bounds every model call by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Vector dimension of the underlying model.
    pub fn dim(&self) -> usize {
        self.model.dim()
    }

    /// Returns the underlying model.
    pub const fn model(&self) -> &M {
        &self.model
    }

    /// Returns the shared cache.
    pub const fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Returns cache counters.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Embeds one text, consulting the cache first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] when the model fails or returns an empty vector,
    /// [`RagError::DimensionMismatch`] when the vector has the wrong length and
    /// [`RagError::Timeout`] when the deadline fires.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = fingerprint(text, self.model.model());
        if let Ok(entry) = self.cache.get(&key) {
            return Ok(entry.vector);
        }

        let vector = self.bounded(self.model.embed(text)).await?;
        if vector.is_empty() {
            return Err(RagError::Embedding(anyhow::anyhow!(
                "model returned an empty vector"
            )));
        }
        if vector.len() != self.dim() {
            return Err(RagError::DimensionMismatch {
                expected: self.dim(),
                actual: vector.len(),
            });
        }

        self.cache.set(&key, vector.clone(), Metadata::new());
        Ok(vector)
    }

    /// Embeds several texts, one result per input in input order.
    ///
    /// Cached texts are served from the cache and duplicate misses are sent to the model once.
    /// An item the model could not embed (empty or wrong-length vector) comes back as `None`.
    ///
    /// # Errors
    ///
    /// Fails as a whole when the model call errors, times out, or returns the wrong number of
    /// vectors.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let keys: Vec<String> = texts
            .iter()
            .map(|text| fingerprint(text, self.model.model()))
            .collect();

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut pending: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut misses: Vec<String> = Vec::new();
        let mut miss_keys: Vec<&str> = Vec::new();

        for (idx, key) in keys.iter().enumerate() {
            if let Some(waiting) = pending.get_mut(key.as_str()) {
                waiting.push(idx);
                continue;
            }
            match self.cache.get(key) {
                Ok(entry) => results[idx] = Some(entry.vector),
                Err(_) => {
                    pending.insert(key.as_str(), vec![idx]);
                    misses.push(texts[idx].clone());
                    miss_keys.push(key.as_str());
                }
            }
        }

        if misses.is_empty() {
            return Ok(results);
        }

        debug!(
            requested = texts.len(),
            misses = misses.len(),
            "embedding batch"
        );
        let vectors = self.bounded(self.model.embed_batch(&misses)).await?;
        if vectors.len() != misses.len() {
            return Err(RagError::Embedding(anyhow::anyhow!(
                "model returned {} vectors for {} texts",
                vectors.len(),
                misses.len()
            )));
        }

        let dim = self.dim();
        for (key, vector) in miss_keys.into_iter().zip(vectors) {
            if vector.is_empty() || vector.len() != dim {
                debug!(key, len = vector.len(), "model could not embed item");
                continue;
            }
            self.cache.set(key, vector.clone(), Metadata::new());
            for &idx in pending.get(key).into_iter().flatten() {
                results[idx] = Some(vector.clone());
            }
        }
        Ok(results)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = recall_core::Result<T>> + Send,
    ) -> Result<T> {
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RagError::Timeout(limit))?,
            None => call.await,
        };
        outcome.map_err(RagError::Embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and texts; returns an empty vector for texts containing "fail".
    struct CountingEmbedder {
        dimension: usize,
        calls: AtomicUsize,
        texts: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                calls: AtomicUsize::new(0),
                texts: AtomicUsize::new(0),
            }
        }

        #[allow(clippy::cast_precision_loss)]
        fn vector_for(&self, text: &str) -> Vec<f32> {
            if text.contains("fail") {
                return Vec::new();
            }
            (0..self.dimension)
                .map(|i| ((text.len() + i) % 7) as f32 + 1.0)
                .collect()
        }
    }

    impl EmbeddingModel for CountingEmbedder {
        fn dim(&self) -> usize {
            self.dimension
        }

        fn model(&self) -> &str {
            "counting"
        }

        async fn embed(&self, text: &str) -> recall_core::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector_for(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> recall_core::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        }
    }

    struct SlowEmbedder;

    impl EmbeddingModel for SlowEmbedder {
        fn dim(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> recall_core::Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(vec![1.0, 0.0])
        }
    }

    struct BrokenEmbedder;

    impl EmbeddingModel for BrokenEmbedder {
        fn dim(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> recall_core::Result<Vec<f32>> {
            anyhow::bail!("provider unavailable")
        }
    }

    fn cache() -> Arc<EmbeddingCache> {
        Arc::new(EmbeddingCache::new(CacheConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn second_embed_hits_cache() {
        let embedder = CachedEmbedder::new(CountingEmbedder::new(3), cache());

        let first = embedder.embed("hello").await.unwrap();
        let second = embedder.embed("hello").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.model().calls.load(Ordering::SeqCst), 1);
        let stats = embedder.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn batch_sends_only_unique_misses() {
        let embedder = CachedEmbedder::new(CountingEmbedder::new(3), cache());
        embedder.embed("cached").await.unwrap();

        let texts = vec!["cached".to_string(), "new".to_string(), "new".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(Option::is_some));
        assert_eq!(vectors[1], vectors[2]);
        // One single embed plus one batch carrying a single text.
        assert_eq!(embedder.model().calls.load(Ordering::SeqCst), 2);
        assert_eq!(embedder.model().texts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_items_are_none_and_not_cached() {
        let embedder = CachedEmbedder::new(CountingEmbedder::new(3), cache());
        let texts = vec!["good".to_string(), "fail here".to_string()];

        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert!(vectors[0].is_some());
        assert!(vectors[1].is_none());
        assert_eq!(embedder.cache().len(), 1);
    }

    #[tokio::test]
    async fn empty_single_vector_is_an_error() {
        let embedder = CachedEmbedder::new(CountingEmbedder::new(3), cache());
        let err = embedder.embed("fail").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn model_errors_are_external() {
        let embedder = CachedEmbedder::new(BrokenEmbedder, cache());
        let err = embedder.embed("x").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::External);
        assert!(err.to_string().contains("provider unavailable"));
    }

    #[tokio::test]
    async fn deadline_fires() {
        let embedder = CachedEmbedder::new(SlowEmbedder, cache())
            .with_timeout(Some(Duration::from_millis(20)));
        let err = embedder.embed("slow").await.unwrap_err();
        assert!(matches!(err, RagError::Timeout(_)));
        assert!(embedder.cache().is_empty());
    }

    #[tokio::test]
    async fn models_do_not_share_entries() {
        let shared = cache();
        let counting = CachedEmbedder::new(CountingEmbedder::new(2), Arc::clone(&shared));
        counting.embed("same text").await.unwrap();

        assert!(shared.contains(&fingerprint("same text", "counting")));
        assert!(!shared.contains(&fingerprint("same text", "default")));
    }
}
