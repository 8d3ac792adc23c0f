//! Single-strategy retriever.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use recall_core::{EmbeddingModel, Tokenizer};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::cache::EmbeddingCache;
use crate::chunking::{Chunker, TextChunker, estimate_tokens};
use crate::config::{ContextConfig, RetrieverConfig};
use crate::context::ContextBuilder;
use crate::embedder::CachedEmbedder;
use crate::error::{RagError, Result};
use crate::index::VectorStore;
use crate::types::{Chunk, Document, Query, RetrievalResult, RetrievalStats};

use super::{Retriever, validate_query};

struct RetrieverState {
    /// Document id to the ids of its stored chunks, in index order.
    registry: BTreeMap<String, Vec<String>>,
    total_queries: u64,
    total_query_time: Duration,
    last_updated: OffsetDateTime,
}

/// Embeds queries through the cache and searches one vector store.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use recall_rag::cache::EmbeddingCache;
/// use recall_rag::config::{CacheConfig, RetrieverConfig};
/// use recall_rag::index::MemoryVectorStore;
/// use recall_rag::retriever::{BasicRetriever, Retriever};
/// use recall_rag::{Document, Query};
///
/// # async fn example(model: impl recall_core::EmbeddingModel) -> recall_rag::Result<()> {
/// let store = Arc::new(MemoryVectorStore::new(model.dim()));
/// let cache = Arc::new(EmbeddingCache::new(CacheConfig::default())?);
/// let retriever = BasicRetriever::new(model, store, cache, RetrieverConfig::default())?;
///
/// retriever.add_document(Document::new("doc", "Rust has no garbage collector.")).await?;
/// let result = retriever.retrieve(&retriever.query("memory management")).await?;
/// for (document, score) in result.iter() {
///     println!("{score:.3} {}", document.id);
/// }
/// # Ok(())
/// # }
/// ```
pub struct BasicRetriever<M> {
    embedder: CachedEmbedder<M>,
    store: Arc<dyn VectorStore>,
    chunker: Option<TextChunker>,
    context: ContextBuilder,
    config: RetrieverConfig,
    state: Mutex<RetrieverState>,
    closed: AtomicBool,
}

impl<M> std::fmt::Debug for BasicRetriever<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicRetriever")
            .field("config", &self.config)
            .field("documents", &self.state.lock().registry.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<M: EmbeddingModel> BasicRetriever<M> {
    /// Creates a retriever over `store`, caching embeddings in `cache`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] for out-of-range defaults, a chunking error for bad
    /// chunking options, and [`RagError::DimensionMismatch`] when the model and store disagree.
    pub fn new(
        model: M,
        store: Arc<dyn VectorStore>,
        cache: Arc<EmbeddingCache>,
        config: RetrieverConfig,
    ) -> Result<Self> {
        if config.default_top_k == 0 {
            return Err(RagError::InvalidConfig("default_top_k must be positive".into()));
        }
        if !(0.0..=1.0).contains(&config.default_threshold) {
            return Err(RagError::InvalidConfig(format!(
                "default_threshold {} outside [0, 1]",
                config.default_threshold
            )));
        }
        if config.max_document_size == 0 {
            return Err(RagError::InvalidConfig(
                "max_document_size must be positive".into(),
            ));
        }
        if model.dim() != store.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: store.dimension(),
                actual: model.dim(),
            });
        }

        let chunker = config.chunking.clone().map(TextChunker::new).transpose()?;
        let embedder = CachedEmbedder::new(model, cache).with_timeout(config.embed_timeout);

        Ok(Self {
            embedder,
            store,
            chunker,
            context: ContextBuilder::default(),
            config,
            state: Mutex::new(RetrieverState {
                registry: BTreeMap::new(),
                total_queries: 0,
                total_query_time: Duration::ZERO,
                last_updated: OffsetDateTime::now_utc(),
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Measures chunks and context in tokens with `tokenizer`.
    ///
    /// # Errors
    ///
    /// Returns a chunking error if the configured options are invalid.
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        if let Some(options) = self.config.chunking.clone() {
            self.chunker = Some(TextChunker::with_tokenizer(options, Arc::clone(&tokenizer))?);
        }
        self.context = self.context.with_tokenizer(tokenizer);
        Ok(self)
    }

    /// Replaces the context configuration used by [`retrieve_context`](Self::retrieve_context).
    #[must_use]
    pub fn with_context(mut self, config: ContextConfig) -> Self {
        let tokenizer = self.context.tokenizer();
        self.context = ContextBuilder::new(config);
        if let Some(tokenizer) = tokenizer {
            self.context = self.context.with_tokenizer(tokenizer);
        }
        self
    }

    /// Builds a query with the configured default `top_k` and threshold.
    #[must_use]
    pub fn query(&self, text: impl Into<String>) -> Query {
        Query::new(text)
            .top_k(self.config.default_top_k)
            .threshold(self.config.default_threshold)
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Returns the vector store.
    pub const fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Returns the cache-backed embedder.
    pub const fn embedder(&self) -> &CachedEmbedder<M> {
        &self.embedder
    }

    /// Retrieves for `query` and renders the hits with the context builder.
    ///
    /// The budget is the smaller of the configured `max_length` and `query.max_tokens`.
    ///
    /// # Errors
    ///
    /// Fails like [`Retriever::retrieve`].
    pub async fn retrieve_context(&self, query: &Query) -> Result<String> {
        let result = self.retrieve(query).await?;
        let budget = query
            .max_tokens
            .map_or(self.context.config().max_length, |limit| {
                limit.min(self.context.config().max_length)
            });
        Ok(self.context.build_with_budget(&result, budget))
    }

    /// Returns the stored chunks of `document_id` in index order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] when the document was never added.
    pub fn document_chunks(&self, document_id: &str) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let chunk_ids = self
            .state
            .lock()
            .registry
            .get(document_id)
            .cloned()
            .ok_or_else(|| RagError::NotFound(document_id.to_string()))?;
        chunk_ids.iter().map(|id| self.store.get(id)).collect()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RagError::Closed("retriever"));
        }
        Ok(())
    }

    pub(crate) fn record_query(&self, elapsed: Duration) {
        let mut state = self.state.lock();
        state.total_queries += 1;
        state.total_query_time += elapsed;
    }

    fn validate_document(&self, document: &Document) -> Result<()> {
        if document.id.trim().is_empty() {
            return Err(RagError::InvalidDocument("document id is empty".into()));
        }
        if document.content.trim().is_empty() {
            return Err(RagError::EmptyDocument);
        }
        if document.size() > self.config.max_document_size {
            return Err(RagError::DocumentTooLarge {
                id: document.id.clone(),
                size: document.size(),
                max: self.config.max_document_size,
            });
        }
        Ok(())
    }

    fn split(&self, document: &Document) -> Result<Vec<Chunk>> {
        if let Some(chunker) = &self.chunker {
            return chunker.chunk(document);
        }
        let mut metadata = document.metadata.clone();
        metadata.insert(crate::types::CHUNK_STRATEGY_KEY.into(), "none".into());
        Ok(vec![Chunk {
            id: Chunk::make_id(&document.id, 0),
            content: document.content.clone(),
            document_id: document.id.clone(),
            index: 0,
            start_pos: 0,
            end_pos: document.content.len(),
            token_count: estimate_tokens(&document.content),
            metadata,
            vector: None,
        }])
    }

    async fn add(&self, document: Document) -> Result<usize> {
        self.ensure_open()?;
        self.validate_document(&document)?;

        let chunks = self.split(&document)?;
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let mut stored = Vec::with_capacity(chunks.len());
        let mut failure = None;
        for (mut chunk, vector) in chunks.into_iter().zip(vectors) {
            let Some(vector) = vector else {
                warn!(chunk = %chunk.id, "skipping chunk without embedding");
                continue;
            };
            chunk.vector = Some(vector);
            let id = chunk.id.clone();
            if let Err(err) = self.store.add(chunk.into_document(&document)) {
                failure = Some(err);
                break;
            }
            stored.push(id);
        }

        let count = stored.len();
        {
            let mut state = self.state.lock();
            let previous = if stored.is_empty() {
                state.registry.remove(&document.id)
            } else {
                state.registry.insert(document.id.clone(), stored.clone())
            };
            // Chunks of an earlier, longer version that were not overwritten.
            for stale in previous.into_iter().flatten() {
                if stored.contains(&stale) {
                    continue;
                }
                match self.store.delete(&stale) {
                    Err(err) if !err.is_not_found() => {
                        warn!(chunk = %stale, error = %err, "failed to remove stale chunk");
                    }
                    _ => {}
                }
            }
            state.last_updated = OffsetDateTime::now_utc();
        }

        if let Some(err) = failure {
            return Err(err);
        }
        if count == 0 {
            warn!(document = %document.id, "no chunk could be embedded");
        } else {
            debug!(document = %document.id, chunks = count, "stored document");
        }
        Ok(count)
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();

        if let Some(chunk_ids) = state.registry.remove(id) {
            for chunk_id in chunk_ids {
                match self.store.delete(&chunk_id) {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
            }
            state.last_updated = OffsetDateTime::now_utc();
            return Ok(());
        }

        self.store.delete(id)?;
        let owner = state
            .registry
            .iter()
            .find(|(_, chunks)| chunks.iter().any(|chunk| chunk == id))
            .map(|(owner, _)| owner.clone());
        if let Some(owner) = owner {
            if let Some(chunks) = state.registry.get_mut(&owner) {
                chunks.retain(|chunk| chunk != id);
                if chunks.is_empty() {
                    state.registry.remove(&owner);
                }
            }
        }
        state.last_updated = OffsetDateTime::now_utc();
        Ok(())
    }
}

impl<M: EmbeddingModel> Retriever for BasicRetriever<M> {
    async fn retrieve(&self, query: &Query) -> Result<RetrievalResult> {
        self.ensure_open()?;
        validate_query(query).map_err(|e| e.context("retrieve"))?;

        let started = Instant::now();
        let vector = self
            .embedder
            .embed(&query.text)
            .await
            .map_err(|e| e.context("retrieve"))?;
        let embedding_time = started.elapsed();

        let search_started = Instant::now();
        let found = self
            .store
            .search_filtered(&vector, query.top_k, Some(query.threshold), &query.filters)
            .map_err(|e| e.context("retrieve"))?;
        let search_time = search_started.elapsed();

        let mut result = RetrievalResult::from_hits(query.clone(), found.hits, found.total_found);
        result.embedding_time = embedding_time;
        result.search_time = search_time;
        result.query_time = started.elapsed();
        self.record_query(result.query_time);

        debug!(
            returned = result.len(),
            total_found = result.total_found,
            embedding_ms = embedding_time.as_millis(),
            search_ms = search_time.as_millis(),
            "retrieved"
        );
        Ok(result)
    }

    async fn add_document(&self, document: Document) -> Result<usize> {
        let id = document.id.clone();
        self.add(document)
            .await
            .map_err(|e| e.context("add_document").with_detail("document_id", id))
    }

    async fn update_document(&self, document: Document) -> Result<usize> {
        match self.delete(&document.id) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.context("update_document")),
        }
        let id = document.id.clone();
        self.add(document)
            .await
            .map_err(|e| e.context("update_document").with_detail("document_id", id))
    }

    fn delete_document(&self, id: &str) -> Result<()> {
        self.delete(id)
            .map_err(|e| e.context("delete_document").with_detail("id", id))
    }

    fn get_document(&self, id: &str) -> Result<Document> {
        self.ensure_open()?;
        self.store
            .get(id)
            .map_err(|e| e.context("get_document").with_detail("id", id))
    }

    fn get_stats(&self) -> RetrievalStats {
        let state = self.state.lock();
        let average_query_time = if state.total_queries == 0 {
            Duration::ZERO
        } else {
            #[allow(clippy::cast_precision_loss)]
            let queries = state.total_queries as f64;
            Duration::from_secs_f64(state.total_query_time.as_secs_f64() / queries)
        };
        RetrievalStats {
            total_documents: state.registry.len(),
            total_chunks: state.registry.values().map(Vec::len).sum(),
            total_queries: state.total_queries,
            average_query_time,
            cache_hit_rate: self.embedder.stats().hit_rate,
            last_updated: state.last_updated,
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.store.close();
        self.embedder.cache().close()?;
        info!("retriever closed");
        Ok(())
    }
}
