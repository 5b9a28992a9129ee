//! SessionStore trait definition.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// Maximum key length accepted by any store (memcached compatible).
pub const MAX_KEY_LENGTH: usize = 250;

/// Abstract key/value interface for session persistence.
///
/// Implementations must be thread-safe (Send + Sync); there is no
/// client-side locking, so concurrent writers to one key race and the last
/// write wins.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Fetches the payload stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Stores `payload` under `key` for at most `ttl`.
    ///
    /// Returns `Ok(false)` when the backend declined the write without a
    /// connectivity fault.
    async fn set(&self, key: &str, payload: Value, ttl: Duration) -> StorageResult<bool>;

    /// Removes `key`. Returns `Ok(false)` if nothing was stored there.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Human-readable backend name used in logs.
    fn backend_name(&self) -> &'static str;
}

/// Validates a store key.
///
/// Keys must be non-empty, at most [`MAX_KEY_LENGTH`] bytes, and free of
/// whitespace and control characters.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            message: "key cannot be empty".to_string(),
        });
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StorageError::InvalidKey {
            message: format!("key exceeds {MAX_KEY_LENGTH} bytes"),
        });
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(StorageError::InvalidKey {
            message: "key contains whitespace or control characters".to_string(),
        });
    }
    Ok(())
}
