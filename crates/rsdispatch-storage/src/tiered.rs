//! Write-through store over several backing caches.
//!
//! Reads consult each tier in order and return the first hit. Writes and
//! deletes go to every tier. A tier that refuses a write has the key purged
//! so it cannot keep serving the previous value; if the purge fails too the
//! write fails. Reads and deletes only fail if every tier failed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::{StorageError, StorageResult};
use crate::traits::{validate_key, SessionStore};

/// Tiered implementation of [`SessionStore`].
#[derive(Clone)]
pub struct TieredSessionStore {
    tiers: Vec<Arc<dyn SessionStore>>,
}

impl TieredSessionStore {
    /// Creates a tiered store. Tiers are consulted in the given order.
    pub fn new(tiers: Vec<Arc<dyn SessionStore>>) -> Self {
        Self { tiers }
    }

    fn no_tiers() -> StorageError {
        StorageError::InternalError {
            message: "tiered store has no backing caches".to_string(),
        }
    }
}

#[async_trait]
impl SessionStore for TieredSessionStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        validate_key(key)?;

        let mut last_error = None;
        let mut any_answered = false;
        for tier in &self.tiers {
            match tier.get(key).await {
                Ok(Some(payload)) => return Ok(Some(payload)),
                Ok(None) => any_answered = true,
                Err(e) => {
                    warn!(backend = tier.backend_name(), error = %e, "session tier read failed");
                    last_error = Some(e);
                }
            }
        }

        if any_answered {
            return Ok(None);
        }
        Err(last_error.unwrap_or_else(Self::no_tiers))
    }

    async fn set(&self, key: &str, payload: Value, ttl: Duration) -> StorageResult<bool> {
        validate_key(key)?;
        if self.tiers.is_empty() {
            return Err(Self::no_tiers());
        }

        let mut written = false;
        let mut stale = Vec::new();
        for tier in &self.tiers {
            match tier.set(key, payload.clone(), ttl).await {
                Ok(true) => written = true,
                Ok(false) => stale.push((tier, None)),
                Err(e) => {
                    warn!(backend = tier.backend_name(), error = %e, "session tier write failed");
                    stale.push((tier, Some(e)));
                }
            }
        }

        for (tier, write_error) in stale {
            if let Err(e) = tier.delete(key).await {
                warn!(
                    backend = tier.backend_name(),
                    key,
                    error = %e,
                    "could not purge stale entry from session tier"
                );
                return Err(write_error.unwrap_or(e));
            }
        }

        Ok(written)
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;

        let mut last_error = None;
        let mut removed = false;
        let mut any_answered = false;
        for tier in &self.tiers {
            match tier.delete(key).await {
                Ok(ok) => {
                    any_answered = true;
                    removed |= ok;
                }
                Err(e) => {
                    warn!(backend = tier.backend_name(), error = %e, "session tier delete failed");
                    last_error = Some(e);
                }
            }
        }

        if any_answered {
            return Ok(removed);
        }
        Err(last_error.unwrap_or_else(Self::no_tiers))
    }

    fn backend_name(&self) -> &'static str {
        "tiered"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheSessionStore, MemorySessionStore};
    use serde_json::json;

    fn tiers() -> (Arc<MemorySessionStore>, Arc<CacheSessionStore>, TieredSessionStore) {
        let memory = MemorySessionStore::new_shared();
        let cache = Arc::new(CacheSessionStore::default());
        let tiered = TieredSessionStore::new(vec![
            Arc::clone(&memory) as Arc<dyn SessionStore>,
            Arc::clone(&cache) as Arc<dyn SessionStore>,
        ]);
        (memory, cache, tiered)
    }

    #[tokio::test]
    async fn test_writes_go_to_every_tier() {
        let (memory, cache, tiered) = tiers();
        tiered
            .set("session:a", json!(1), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(memory.get("session:a").await.unwrap(), Some(json!(1)));
        assert_eq!(cache.get("session:a").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_reads_fall_through_a_failed_tier() {
        let (memory, _cache, tiered) = tiers();
        tiered
            .set("session:b", json!(2), Duration::from_secs(60))
            .await
            .unwrap();

        memory.simulate_outage(true);
        assert_eq!(tiered.get("session:b").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_fails_only_when_every_tier_fails() {
        let memory = MemorySessionStore::new_shared();
        let tiered = TieredSessionStore::new(vec![Arc::clone(&memory) as Arc<dyn SessionStore>]);
        memory.simulate_outage(true);

        assert!(tiered.get("session:c").await.is_err());
        assert!(tiered
            .set("session:c", json!(3), Duration::from_secs(1))
            .await
            .is_err());
    }

    /// Accepts reads and deletes but refuses every write.
    struct ReadOnlyTier(MemorySessionStore);

    #[async_trait]
    impl SessionStore for ReadOnlyTier {
        async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
            self.0.get(key).await
        }

        async fn set(&self, _key: &str, _payload: Value, _ttl: Duration) -> StorageResult<bool> {
            Err(StorageError::ConnectionError {
                message: "write refused".to_string(),
            })
        }

        async fn delete(&self, key: &str) -> StorageResult<bool> {
            self.0.delete(key).await
        }

        fn backend_name(&self) -> &'static str {
            "read-only"
        }
    }

    #[tokio::test]
    async fn test_refused_write_purges_previous_value() {
        let first = MemorySessionStore::new();
        first
            .set("caller_version:c1", json!(1), Duration::from_secs(60))
            .await
            .unwrap();
        let first = Arc::new(ReadOnlyTier(first));
        let second = MemorySessionStore::new_shared();
        let tiered = TieredSessionStore::new(vec![
            Arc::clone(&first) as Arc<dyn SessionStore>,
            Arc::clone(&second) as Arc<dyn SessionStore>,
        ]);

        assert!(tiered
            .set("caller_version:c1", json!(2), Duration::from_secs(60))
            .await
            .unwrap());

        assert_eq!(first.get("caller_version:c1").await.unwrap(), None);
        assert_eq!(
            tiered.get("caller_version:c1").await.unwrap(),
            Some(json!(2))
        );
    }

    #[tokio::test]
    async fn test_write_fails_when_a_tier_can_neither_write_nor_purge() {
        let (memory, cache, tiered) = tiers();
        memory.simulate_outage(true);

        assert!(tiered
            .set("session:e", json!(5), Duration::from_secs(60))
            .await
            .is_err());
        // The healthy tier still took the write.
        assert_eq!(cache.get("session:e").await.unwrap(), Some(json!(5)));
    }

    #[tokio::test]
    async fn test_empty_tier_list_is_an_error() {
        let tiered = TieredSessionStore::new(Vec::new());
        assert!(tiered.get("session:d").await.is_err());
    }
}
