//! In-memory session store.
//!
//! Uses `DashMap` for lock-free concurrent access. Expired entries are removed
//! lazily on read, so memory is reclaimed when a key is next touched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::traits::{validate_key, SessionStore};

#[derive(Debug, Clone)]
struct Entry {
    payload: Value,
    /// `None` when the TTL was too large to represent.
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory implementation of [`SessionStore`].
///
/// # Performance Characteristics
///
/// - **get / set / delete**: O(1) average (DashMap shard lookup)
///
/// An outage switch lets tests exercise the connection-failure paths of the
/// session manager without a real network cache.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, Entry>,
    unavailable: AtomicBool,
}

impl MemorySessionStore {
    /// Creates a new in-memory session store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory session store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Makes every subsequent operation fail with a connection error
    /// (`true`) or behave normally again (`false`).
    pub fn simulate_outage(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Returns true when no live entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionError {
                message: "memory store marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Computes an absolute expiry, or `None` if `ttl` overflows the calendar.
pub(crate) fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    #[instrument(skip(self), level = "trace")]
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        validate_key(key)?;
        self.ensure_available()?;

        let now = Utc::now();
        match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.payload.clone())),
            Some(_) => {}
        }

        // Shard guard is released at the end of the match statement.
        self.entries.remove_if(key, |_, e| e.is_expired(now));
        Ok(None)
    }

    #[instrument(skip(self, payload), level = "trace")]
    async fn set(&self, key: &str, payload: Value, ttl: Duration) -> StorageResult<bool> {
        validate_key(key)?;
        self.ensure_available()?;

        let entry = Entry {
            payload,
            expires_at: expiry_from(Utc::now(), ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(true)
    }

    #[instrument(skip(self), level = "trace")]
    async fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        self.ensure_available()?;

        Ok(self.entries.remove(key).is_some())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
