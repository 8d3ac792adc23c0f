//! Content-addressed embedding cache with LRU eviction and optional TTL.
//!
//! Keys are [`fingerprint`]s of `(text, model)`. Every successful [`EmbeddingCache::get`] and
//! every [`EmbeddingCache::set`] moves the entry to the most-recently-used end; inserting past
//! `max_size` evicts from the least-recently-used end. Expiry is checked lazily on read.
//!
//! Entry lifecycle: absent → present → evicted | expired | deleted.

mod lru;
mod persist;

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{RagError, Result};
use crate::types::Metadata;

use lru::{Handle, LruList};

/// Computes the cache key for `text` embedded by `model`.
///
/// The key is the lowercase hex SHA-256 of the model name, a NUL separator and the text, so it
/// is stable across runs and never collides between models.
#[must_use]
pub fn fingerprint(text: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A cached embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint the entry is stored under.
    pub key: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Caller supplied metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// When the entry was first inserted.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the entry was last read or written.
    #[serde(with = "time::serde::rfc3339")]
    pub accessed_at: OffsetDateTime,
    /// Number of reads and writes, at least 1.
    pub access_count: u64,
    /// Approximate footprint in bytes, for accounting only.
    pub size: usize,
}

impl CacheEntry {
    fn new(key: String, vector: Vec<f32>, metadata: Metadata) -> Self {
        let now = OffsetDateTime::now_utc();
        let size = entry_size(&key, &vector, &metadata);
        Self {
            key,
            vector,
            metadata,
            created_at: now,
            accessed_at: now,
            access_count: 1,
            size,
        }
    }

    fn is_expired(&self, ttl: Option<std::time::Duration>, now: OffsetDateTime) -> bool {
        // Compare elapsed time; `created_at + ttl` overflows for very long TTLs.
        ttl.is_some_and(|ttl| now - self.created_at > ttl)
    }
}

/// Key length plus four bytes per component plus metadata byte length.
fn entry_size(key: &str, vector: &[f32], metadata: &Metadata) -> usize {
    let metadata_bytes: usize = metadata.iter().map(|(k, v)| k.len() + v.len()).sum();
    key.len() + vector.len() * std::mem::size_of::<f32>() + metadata_bytes
}

/// Cumulative cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Successful lookups.
    pub hits: u64,
    /// Failed lookups, including expired entries.
    pub misses: u64,
    /// `hits / (hits + misses)`, zero before the first lookup.
    pub hit_rate: f64,
    /// Entries currently held.
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Approximate bytes held, summed over entries.
    pub memory_usage: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    map: HashMap<String, Handle>,
    list: LruList<CacheEntry>,
    hits: u64,
    misses: u64,
    closed: bool,
}

impl CacheState {
    /// Inserts a fresh entry at the front and evicts until within `max_size`.
    fn insert(&mut self, entry: CacheEntry, max_size: usize) {
        let key = entry.key.clone();
        let handle = self.list.push_front(entry);
        self.map.insert(key, handle);
        while self.list.len() > max_size {
            let Some(evicted) = self.list.back().and_then(|lru| self.list.remove(lru)) else {
                break;
            };
            self.map.remove(&evicted.key);
            debug!(key = %evicted.key, "evicted least recently used embedding");
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let handle = self.map.remove(key)?;
        self.list.remove(handle)
    }
}

/// Thread-safe LRU + TTL cache of embedding vectors.
///
/// A single readers-writer lock guards the entry map and the recency list. Reads that promote
/// an entry take the write side; [`stats`](Self::stats) and [`contains`](Self::contains) take
/// the read side.
///
/// # Example
///
/// ```rust
/// use recall_rag::cache::{fingerprint, EmbeddingCache};
/// use recall_rag::config::CacheConfig;
/// use recall_rag::Metadata;
///
/// let cache = EmbeddingCache::new(CacheConfig::builder().max_size(2).build()).unwrap();
/// let key = fingerprint("hello", "mini-lm");
/// cache.set(&key, vec![0.1, 0.2], Metadata::new());
/// assert_eq!(cache.get(&key).unwrap().vector, vec![0.1, 0.2]);
/// ```
pub struct EmbeddingCache {
    config: CacheConfig,
    state: RwLock<CacheState>,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("EmbeddingCache")
            .field("config", &self.config)
            .field("len", &state.list.len())
            .finish()
    }
}

impl EmbeddingCache {
    /// Creates a cache, reloading persisted entries when a path is configured.
    ///
    /// Load failures are logged and the cache starts empty.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] when `max_size` is zero.
    pub fn new(config: CacheConfig) -> Result<Self> {
        if config.max_size == 0 {
            return Err(RagError::InvalidConfig(
                "cache max_size must be positive".into(),
            ));
        }

        let mut state = CacheState::default();
        if let Some(path) = &config.persist_path {
            match persist::load(path) {
                Ok(mut entries) => {
                    let now = OffsetDateTime::now_utc();
                    entries.retain(|entry| !entry.is_expired(config.ttl, now));
                    entries.sort_by_key(|entry| entry.created_at);
                    let loaded = entries.len().min(config.max_size);
                    for entry in entries {
                        state.insert(entry, config.max_size);
                    }
                    info!(path = %path.display(), loaded, "loaded embedding cache");
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to load embedding cache, starting empty");
                }
            }
        }

        Ok(Self {
            config,
            state: RwLock::new(state),
        })
    }

    /// Returns the entry stored under `key` and marks it most recently used.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::KeyNotFound`] when the key is absent or its TTL has elapsed. Expired
    /// entries are removed.
    pub fn get(&self, key: &str) -> Result<CacheEntry> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.state.write();

        let Some(&handle) = state.map.get(key) else {
            state.misses += 1;
            return Err(RagError::KeyNotFound(key.to_string()));
        };

        let expired = state
            .list
            .get(handle)
            .is_none_or(|entry| entry.is_expired(self.config.ttl, now));
        if expired {
            state.remove(key);
            state.misses += 1;
            debug!(key, "embedding cache entry expired");
            return Err(RagError::KeyNotFound(key.to_string()));
        }

        state.list.move_to_front(handle);
        state.hits += 1;
        let entry = state
            .list
            .get_mut(handle)
            .ok_or_else(|| RagError::KeyNotFound(key.to_string()))?;
        entry.accessed_at = now;
        entry.access_count += 1;
        Ok(entry.clone())
    }

    /// Inserts or overwrites the entry for `key` and marks it most recently used.
    ///
    /// Overwriting keeps the original creation time and does not change the cache size.
    pub fn set(&self, key: &str, vector: Vec<f32>, metadata: Metadata) {
        let mut state = self.state.write();

        if let Some(&handle) = state.map.get(key) {
            state.list.move_to_front(handle);
            if let Some(entry) = state.list.get_mut(handle) {
                entry.size = entry_size(key, &vector, &metadata);
                entry.vector = vector;
                entry.metadata = metadata;
                entry.accessed_at = OffsetDateTime::now_utc();
                entry.access_count += 1;
            }
            return;
        }

        state.insert(
            CacheEntry::new(key.to_string(), vector, metadata),
            self.config.max_size,
        );
    }

    /// Removes the entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::KeyNotFound`] when the key is absent.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.state
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RagError::KeyNotFound(key.to_string()))
    }

    /// Removes every entry. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.map.clear();
        state.list.clear();
    }

    /// Returns `true` if a live entry exists for `key`, without touching recency or counters.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = OffsetDateTime::now_utc();
        let state = self.state.read();
        state
            .map
            .get(key)
            .and_then(|&handle| state.list.get(handle))
            .is_some_and(|entry| !entry.is_expired(self.config.ttl, now))
    }

    /// Number of entries currently held, expired ones included until they are touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().list.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys from most to least recently used.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.state
            .read()
            .list
            .iter()
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn prune_expired(&self) -> usize {
        let Some(ttl) = self.config.ttl else {
            return 0;
        };
        let now = OffsetDateTime::now_utc();
        let mut state = self.state.write();
        let expired: Vec<String> = state
            .list
            .iter()
            .filter(|entry| entry.is_expired(Some(ttl), now))
            .map(|entry| entry.key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "pruned expired embeddings");
        }
        expired.len()
    }

    /// Returns cumulative counters and current occupancy.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.state.read();
        let lookups = state.hits + state.misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            state.hits as f64 / lookups as f64
        };
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            hit_rate,
            size: state.list.len(),
            max_size: self.config.max_size,
            memory_usage: state.list.iter().map(|entry| entry.size).sum(),
        }
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Writes live entries to the configured path. Does nothing without a path.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.config.persist_path else {
            return Ok(());
        };
        let now = OffsetDateTime::now_utc();
        let entries: Vec<CacheEntry> = self
            .state
            .read()
            .list
            .iter()
            .filter(|entry| !entry.is_expired(self.config.ttl, now))
            .cloned()
            .collect();
        let count = entries.len();
        persist::save(path, entries)?;
        debug!(path = %path.display(), count, "persisted embedding cache");
        Ok(())
    }

    /// Persists the cache if configured. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when persisting fails.
    pub fn close(&self) -> Result<()> {
        if self.state.read().closed {
            return Ok(());
        }
        // Stay open on failure so a later close retries the write.
        self.save()?;
        self.state.write().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::tempdir;

    fn cache(max_size: usize) -> EmbeddingCache {
        EmbeddingCache::new(CacheConfig::builder().max_size(max_size).build()).unwrap()
    }

    fn set(cache: &EmbeddingCache, key: &str) {
        cache.set(key, vec![1.0, 2.0], Metadata::new());
    }

    #[test]
    fn fingerprint_is_stable_and_model_scoped() {
        let a = fingerprint("hello", "model-a");
        assert_eq!(a, fingerprint("hello", "model-a"));
        assert_ne!(a, fingerprint("hello", "model-b"));
        assert_ne!(a, fingerprint("hello!", "model-a"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn overflow_evicts_first_inserted() {
        let cache = cache(3);
        for key in ["k1", "k2", "k3", "k4"] {
            set(&cache, key);
        }

        assert!(matches!(cache.get("k1"), Err(RagError::KeyNotFound(_))));
        for key in ["k2", "k3", "k4"] {
            assert!(cache.get(key).is_ok(), "{key} should be present");
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn read_promotes_entry() {
        let cache = cache(3);
        for key in ["k1", "k2", "k3"] {
            set(&cache, key);
        }
        cache.get("k1").unwrap();
        set(&cache, "k4");

        assert!(cache.get("k2").is_err());
        assert!(cache.get("k1").is_ok());
        assert!(cache.get("k3").is_ok());
        assert!(cache.get("k4").is_ok());
    }

    #[test]
    fn lru_scenario_with_two_slots() {
        let cache = cache(2);
        set(&cache, "x");
        set(&cache, "y");
        cache.get("x").unwrap();
        set(&cache, "z");

        assert!(matches!(cache.get("y"), Err(RagError::KeyNotFound(_))));
        assert!(cache.get("x").is_ok());
        assert!(cache.get("z").is_ok());
    }

    #[test]
    fn overwrite_refreshes_without_growing() {
        let cache = cache(2);
        set(&cache, "a");
        set(&cache, "b");
        cache.set("a", vec![9.0], Metadata::new());
        set(&cache, "c");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().vector, vec![9.0]);
        assert!(cache.get("b").is_err());
    }

    #[test]
    fn get_updates_access_bookkeeping() {
        let cache = cache(2);
        set(&cache, "a");
        let first = cache.get("a").unwrap();
        let second = cache.get("a").unwrap();

        assert_eq!(first.access_count, 2);
        assert_eq!(second.access_count, 3);
        assert!(second.accessed_at >= first.accessed_at);
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn ttl_expiry_counts_a_miss() {
        let cache = EmbeddingCache::new(
            CacheConfig::builder()
                .max_size(4)
                .ttl(Duration::from_millis(20))
                .build(),
        )
        .unwrap();
        set(&cache, "short");
        sleep(Duration::from_millis(60));

        assert!(!cache.contains("short"));
        assert!(matches!(cache.get("short"), Err(RagError::KeyNotFound(_))));
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn unbounded_ttl_keeps_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let config = CacheConfig::builder()
            .max_size(4)
            .ttl(Duration::MAX)
            .persist_path(&path)
            .build();
        let cache = EmbeddingCache::new(config.clone()).unwrap();
        set(&cache, "k");

        assert!(cache.get("k").is_ok());
        assert!(cache.contains("k"));
        assert_eq!(cache.prune_expired(), 0);
        cache.close().unwrap();

        let reloaded = EmbeddingCache::new(config).unwrap();
        assert_eq!(reloaded.keys(), ["k"]);
    }

    #[test]
    fn prune_expired_drops_stale_entries() {
        let cache = EmbeddingCache::new(
            CacheConfig::builder()
                .max_size(4)
                .ttl(Duration::from_millis(20))
                .build(),
        )
        .unwrap();
        set(&cache, "a");
        set(&cache, "b");
        sleep(Duration::from_millis(60));
        set(&cache, "fresh");

        assert_eq!(cache.prune_expired(), 2);
        assert_eq!(cache.keys(), ["fresh"]);
    }

    #[test]
    fn delete_and_clear() {
        let cache = cache(4);
        set(&cache, "a");
        set(&cache, "b");

        cache.delete("a").unwrap();
        assert!(matches!(cache.delete("a"), Err(RagError::KeyNotFound(_))));

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("b").is_err());
    }

    #[test]
    fn stats_track_hits_misses_and_memory() {
        let cache = cache(4);
        let mut metadata = Metadata::new();
        metadata.insert("m".into(), "xy".into());
        cache.set("key", vec![0.0; 3], metadata);

        cache.get("key").unwrap();
        cache.get("key").unwrap();
        cache.get("missing").unwrap_err();

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_size, 4);
        assert_eq!(stats.memory_usage, 3 + 12 + 3);
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            EmbeddingCache::new(CacheConfig::builder().max_size(0).build()),
            Err(RagError::InvalidConfig(_))
        ));
    }

    #[test]
    fn close_persists_and_reload_respects_capacity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        {
            let cache = EmbeddingCache::new(
                CacheConfig::builder()
                    .max_size(3)
                    .persist_path(&path)
                    .build(),
            )
            .unwrap();
            for key in ["a", "b", "c"] {
                set(&cache, key);
            }
            cache.close().unwrap();
            cache.close().unwrap();
        }
        assert!(path.exists());

        let reloaded =
            EmbeddingCache::new(CacheConfig::builder().max_size(2).persist_path(&path).build())
                .unwrap();
        assert_eq!(reloaded.len(), 2);

        let full =
            EmbeddingCache::new(CacheConfig::builder().max_size(8).persist_path(&path).build())
                .unwrap();
        assert_eq!(full.len(), 3);
        assert_eq!(full.get("b").unwrap().vector, vec![1.0, 2.0]);
    }

    #[test]
    fn failed_close_can_be_retried() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "a file where a directory should be").unwrap();
        let path = blocker.join("cache.json");

        let cache =
            EmbeddingCache::new(CacheConfig::builder().max_size(2).persist_path(&path).build())
                .unwrap();
        set(&cache, "a");

        let err = cache.close().unwrap_err();
        assert!(matches!(err, RagError::Persistence { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::Internal);
        assert!(cache.close().is_err());

        std::fs::remove_file(&blocker).unwrap();
        cache.close().unwrap();
        assert!(path.exists());
        cache.close().unwrap();
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();

        let cache =
            EmbeddingCache::new(CacheConfig::builder().max_size(2).persist_path(&path).build())
                .unwrap();
        assert!(cache.is_empty());
    }
}
