//! Bounded session store backed by Moka.
//!
//! Moka provides lock-free concurrent reads, per-entry expiry and a memory
//! bound, so this store suits a single process that must not grow without
//! limit. Each entry carries its own TTL through a custom [`Expiry`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;
use tracing::instrument;

use crate::error::StorageResult;
use crate::traits::{validate_key, SessionStore};

/// Longest TTL handed to Moka; larger values are clamped.
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Configuration for [`CacheSessionStore`].
#[derive(Debug, Clone)]
pub struct CacheSessionStoreConfig {
    /// Maximum number of entries kept before eviction.
    pub max_capacity: u64,
}

impl Default for CacheSessionStoreConfig {
    fn default() -> Self {
        Self {
            max_capacity: 100_000,
        }
    }
}

impl CacheSessionStoreConfig {
    /// Sets the maximum capacity.
    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }
}

#[derive(Debug, Clone)]
struct CachedPayload {
    payload: Value,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedPayload> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedPayload,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedPayload,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Moka-backed implementation of [`SessionStore`].
#[derive(Clone)]
pub struct CacheSessionStore {
    cache: Cache<String, CachedPayload>,
}

impl std::fmt::Debug for CacheSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSessionStore")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl CacheSessionStore {
    /// Creates a new cache store.
    pub fn new(config: CacheSessionStoreConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Flushes pending maintenance so counts are accurate (tests only need this).
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Approximate number of cached entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for CacheSessionStore {
    fn default() -> Self {
        Self::new(CacheSessionStoreConfig::default())
    }
}

#[async_trait]
impl SessionStore for CacheSessionStore {
    #[instrument(skip(self), level = "trace")]
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        validate_key(key)?;
        Ok(self.cache.get(key).await.map(|cached| cached.payload))
    }

    #[instrument(skip(self, payload), level = "trace")]
    async fn set(&self, key: &str, payload: Value, ttl: Duration) -> StorageResult<bool> {
        validate_key(key)?;
        let cached = CachedPayload {
            payload,
            ttl: ttl.min(MAX_TTL),
        };
        self.cache.insert(key.to_string(), cached).await;
        Ok(true)
    }

    #[instrument(skip(self), level = "trace")]
    async fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.cache.remove(key).await.is_some())
    }

    fn backend_name(&self) -> &'static str {
        "cache"
    }
}
