//! Two-level keyed cache with single-flight recomputation.
//!
//! A [`CacheSet`] is a named, typed key→value store with per-entry TTLs.
//! Entries live in a process-local map; sets constructed with a shared tier
//! additionally publish every write to it, and consult it on local miss
//! before declaring a key absent. `mutex_get_set` coalesces concurrent
//! recomputations: at most one producer runs per set at a time within a
//! process.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{trace, warn};

/// Errors surfaced by cache producers and the shared tier.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("shared store error: {0}")]
    Shared(String),
}

/// The shared lower tier: a remote key-value store holding JSON values with
/// per-entry TTLs. Addressed only on local miss; writes publish after the
/// local store succeeds.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process implementation of [`SharedStore`].
#[derive(Default)]
pub struct MemorySharedStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStore for MemorySharedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Per-key last-modified timestamps, shared across all sets. Answers
/// `If-Modified-Since`-style questions about cached artifacts.
#[derive(Default)]
pub struct LastModified {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl LastModified {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn touch(&self, key: &str) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), Utc::now());
    }

    pub async fn get(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(key).copied()
    }
}

/// Builds the process's cache sets: one shared last-modified map, and an
/// optional shared tier that mirrored sets publish into.
#[derive(Default)]
pub struct CacheContext {
    last_modified: Arc<LastModified>,
    shared: Option<Arc<dyn SharedStore>>,
}

impl CacheContext {
    /// A context with no shared tier: every set is process-local.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose mirrored sets publish into `shared`.
    pub fn with_shared(shared: Arc<dyn SharedStore>) -> Self {
        Self {
            last_modified: Arc::new(LastModified::new()),
            shared: Some(shared),
        }
    }

    pub fn last_modified(&self) -> Arc<LastModified> {
        self.last_modified.clone()
    }

    /// A set that stays process-local regardless of configuration.
    pub fn local_set<T>(&self, prefix: impl Into<String>) -> CacheSet<T>
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync,
    {
        CacheSet::new(prefix, self.last_modified.clone())
    }

    /// A set mirrored into the shared tier when one is configured.
    pub fn mirrored_set<T>(&self, prefix: impl Into<String>) -> CacheSet<T>
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync,
    {
        match &self.shared {
            Some(shared) => {
                CacheSet::with_shared(prefix, self.last_modified.clone(), shared.clone())
            }
            None => CacheSet::new(prefix, self.last_modified.clone()),
        }
    }
}

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// A named, typed cache set.
pub struct CacheSet<T> {
    prefix: String,
    entries: RwLock<HashMap<String, Entry<T>>>,
    /// Serializes producers in `mutex_get_set`.
    flight: Mutex<()>,
    shared: Option<Arc<dyn SharedStore>>,
    last_modified: Arc<LastModified>,
}

impl<T> CacheSet<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// A process-local set.
    pub fn new(prefix: impl Into<String>, last_modified: Arc<LastModified>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: RwLock::new(HashMap::new()),
            flight: Mutex::new(()),
            shared: None,
            last_modified,
        }
    }

    /// A set mirrored into the shared tier.
    pub fn with_shared(
        prefix: impl Into<String>,
        last_modified: Arc<LastModified>,
        shared: Arc<dyn SharedStore>,
    ) -> Self {
        Self {
            shared: Some(shared),
            ..Self::new(prefix, last_modified)
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Look a key up, consulting the shared tier on local miss. Shared-tier
    /// failures degrade to a miss.
    pub async fn get(&self, key: &str) -> Option<T> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if Instant::now() < entry.expires_at {
                    return Some(entry.value.clone());
                }
            }
        }

        let shared = self.shared.as_ref()?;
        match shared.get(&self.full_key(key)).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(key, error = %err, "discarding undecodable shared cache value");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(key, error = %err, "shared cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a value. The local write always succeeds; the shared publish
    /// happens afterwards and its failure is non-fatal.
    pub async fn set(&self, key: &str, value: T, ttl: Duration) {
        trace!(set = %self.prefix, key, "setting value to cache");
        {
            let mut entries = self.entries.write().await;
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }
        self.last_modified.touch(&self.full_key(key)).await;

        if let Some(shared) = &self.shared {
            match serde_json::to_string(&value) {
                Ok(raw) => {
                    if let Err(err) = shared.set(&self.full_key(key), raw, ttl).await {
                        warn!(key, error = %err, "shared cache publish failed");
                    }
                }
                Err(err) => warn!(key, error = %err, "failed to serialize cache value"),
            }
        }
    }

    /// When this set's `key` was last written, if ever.
    pub async fn last_modified(&self, key: &str) -> Option<DateTime<Utc>> {
        self.last_modified.get(&self.full_key(key)).await
    }

    pub async fn delete(&self, key: &str) {
        trace!(set = %self.prefix, key, "deleting value from cache");
        self.entries.write().await.remove(key);
        if let Some(shared) = &self.shared {
            if let Err(err) = shared.delete(&self.full_key(key)).await {
                warn!(key, error = %err, "shared cache delete failed");
            }
        }
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Get the value for `key`, or compute it with `producer` if absent.
    ///
    /// At most one producer runs per set at a time within this process:
    /// callers that miss wait for the in-flight producer and then observe its
    /// value. Returns `(computed, value)` where `computed` is false on a
    /// cache hit. A producer error is not cached and the lock is released.
    pub async fn mutex_get_set<F, Fut, E>(
        &self,
        key: &str,
        producer: F,
        ttl: Duration,
    ) -> Result<(bool, T), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok((false, value));
        }

        let _guard = self.flight.lock().await;

        // Re-check: another caller may have produced while we waited.
        if let Some(value) = self.get(key).await {
            return Ok((false, value));
        }

        let value = producer().await?;
        self.set(key, value.clone(), ttl).await;
        Ok((true, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn local_set(prefix: &str) -> CacheSet<String> {
        CacheSet::new(prefix, Arc::new(LastModified::new()))
    }

    #[tokio::test]
    async fn test_get_set_round_trip() {
        let cache = local_set("test");
        assert_eq!(cache.get("k").await, None);

        cache
            .set("k", "value".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await, Some("value".to_string()));

        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let cache = local_set("test");
        cache
            .set("k", "value".to_string(), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = local_set("test");
        cache
            .set("a", "1".to_string(), Duration::from_secs(60))
            .await;
        cache
            .set("b", "2".to_string(), Duration::from_secs(60))
            .await;
        cache.clear().await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, None);
    }

    #[tokio::test]
    async fn test_distinct_sets_do_not_collide() {
        let last_modified = Arc::new(LastModified::new());
        let shared: Arc<dyn SharedStore> = Arc::new(MemorySharedStore::new());
        let a: CacheSet<String> =
            CacheSet::with_shared("set_a", last_modified.clone(), shared.clone());
        let b: CacheSet<String> = CacheSet::with_shared("set_b", last_modified, shared);

        a.set("k", "from_a".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(b.get("k").await, None);
        assert_eq!(a.get("k").await, Some("from_a".to_string()));
    }

    #[tokio::test]
    async fn test_shared_tier_hit_on_local_miss() {
        let last_modified = Arc::new(LastModified::new());
        let shared: Arc<dyn SharedStore> = Arc::new(MemorySharedStore::new());

        let writer: CacheSet<String> =
            CacheSet::with_shared("set", last_modified.clone(), shared.clone());
        writer
            .set("k", "published".to_string(), Duration::from_secs(60))
            .await;

        // A fresh set with an empty local map simulates another process.
        let reader: CacheSet<String> = CacheSet::with_shared("set", last_modified, shared);
        assert_eq!(reader.get("k").await, Some("published".to_string()));
    }

    #[tokio::test]
    async fn test_mutex_get_set_single_flight() {
        let cache = Arc::new(local_set("test"));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                let (_, value) = cache
                    .mutex_get_set(
                        "k",
                        || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, CacheError>("computed".to_string())
                        },
                        Duration::from_secs(60),
                    )
                    .await
                    .unwrap();
                value
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "computed");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mutex_get_set_error_not_cached() {
        let cache = local_set("test");

        let result = cache
            .mutex_get_set(
                "k",
                || async { Err::<String, _>(CacheError::Shared("boom".into())) },
                Duration::from_secs(60),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(cache.get("k").await, None);

        // The lock was released and the next producer runs.
        let (computed, value) = cache
            .mutex_get_set(
                "k",
                || async { Ok::<_, CacheError>("ok".to_string()) },
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert!(computed);
        assert_eq!(value, "ok");
    }

    #[tokio::test]
    async fn test_context_mirrored_set_publishes() {
        let shared: Arc<dyn SharedStore> = Arc::new(MemorySharedStore::new());
        let caches = CacheContext::with_shared(shared.clone());

        let mirrored: CacheSet<String> = caches.mirrored_set("mirrored");
        mirrored
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await;
        assert!(shared.get("mirrored:k").await.unwrap().is_some());

        let local: CacheSet<String> = caches.local_set("local");
        local
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await;
        assert!(shared.get("local:k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_stamps_last_modified() {
        let last_modified = Arc::new(LastModified::new());
        let cache: CacheSet<String> = CacheSet::new("set", last_modified.clone());

        assert!(last_modified.get("set:k").await.is_none());
        cache
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await;
        assert!(last_modified.get("set:k").await.is_some());
        assert!(cache.last_modified("k").await.is_some());
        assert!(cache.last_modified("other").await.is_none());
    }
}
