//! Session persistence.
//!
//! Sessions live in the [`SessionStore`] under `session:<id>`; the current
//! version of each caller record lives under `caller_version:<caller_id>`.
//! A session is valid only while its caller version matches the stored one,
//! so bumping the stored version silently invalidates every session minted
//! against the old record.
//!
//! Store faults never escape `save`, `load`, `update_caller_version` or
//! `delete`: they are logged and surface as the `Fail` outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};

use rsdispatch_domain::{Permissions, Session};
use rsdispatch_storage::{
    CacheSessionStore, CacheSessionStoreConfig, MemorySessionStore, SessionStore,
    TieredSessionStore,
};

use crate::config::SessionSettings;
use crate::reporting::{LogLevel, Reporter};

/// Lifetime of persisted sessions and caller version records.
pub const SESSION_TTL: Duration = Duration::from_secs(48 * 60 * 60);

const SESSION_PREFIX: &str = "session:";
const CALLER_VERSION_PREFIX: &str = "caller_version:";

/// Outcome of `save` and `update_caller_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Ok,
    /// The store holds a newer caller version.
    Outdated,
    Fail,
}

/// Outcome of `load`.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Ok(Session),
    /// The record exists but its caller version is no longer current.
    Outdated,
    NotFound,
    Fail,
}

/// Outcome of `delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Ok,
    Fail,
}

/// Result of deriving a session for a downstream call.
#[derive(Debug, Clone, PartialEq)]
pub enum Augmentation {
    /// No extra grants; reuse the caller's session as is.
    Unchanged,
    /// A persisted copy with a new id and merged permissions.
    Derived(Session),
    /// The caller version changed underneath the session.
    Outdated,
}

/// Hard failure while deriving a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not persist derived session for caller {caller_id}")]
    Storage { caller_id: String },

    #[error("session {session_id} has no caller id")]
    MissingCallerId { session_id: String },
}

fn session_key(session_id: &str) -> String {
    format!("{SESSION_PREFIX}{session_id}")
}

fn caller_version_key(caller_id: &str) -> String {
    format!("{CALLER_VERSION_PREFIX}{caller_id}")
}

/// Builds the configured session store.
pub fn store_from_settings(settings: &SessionSettings) -> Arc<dyn SessionStore> {
    let cache = || {
        Arc::new(CacheSessionStore::new(
            CacheSessionStoreConfig::default().with_max_capacity(settings.cache_capacity),
        )) as Arc<dyn SessionStore>
    };
    match settings.backend.as_str() {
        "cache" => cache(),
        "tiered" => Arc::new(TieredSessionStore::new(vec![
            cache(),
            MemorySessionStore::new_shared() as Arc<dyn SessionStore>,
        ])),
        _ => MemorySessionStore::new_shared(),
    }
}

/// Session persistence operations over a [`SessionStore`].
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    reporter: Arc<dyn Reporter>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, reporter: Arc<dyn Reporter>) -> Self {
        Self { store, reporter }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    async fn fault(&self, operation: &str, detail: Value) {
        warn!(operation, %detail, backend = self.store.backend_name(), "session store fault");
        self.reporter
            .report(LogLevel::Error, "Session", operation, detail)
            .await;
    }

    /// Persists `session` with a 48 hour TTL, recording its expiry.
    ///
    /// The caller's stored version is reconciled first; a strictly newer
    /// stored version refuses the save with `Outdated`.
    pub async fn save(&self, session: &mut Session) -> SaveOutcome {
        let Some(caller_id) = session.caller_id.clone() else {
            self.fault(
                "save",
                json!({ "session_id": session.session_id, "reason": "missing caller id" }),
            )
            .await;
            return SaveOutcome::Fail;
        };

        match self
            .update_caller_version(&caller_id, session.caller_version)
            .await
        {
            SaveOutcome::Ok => {}
            other => return other,
        }

        let expires_at = Utc::now()
            + chrono::Duration::from_std(SESSION_TTL).unwrap_or(chrono::Duration::zero());
        let mut payload = session.to_map();
        payload["expires_at"] = json!(expires_at);

        match self
            .store
            .set(&session_key(&session.session_id), payload, SESSION_TTL)
            .await
        {
            Ok(true) => {
                session.expires_at = Some(expires_at);
                debug!(session_id = %session.session_id, "session saved");
                SaveOutcome::Ok
            }
            Ok(false) => {
                self.fault(
                    "save",
                    json!({ "session_id": session.session_id, "reason": "store refused write" }),
                )
                .await;
                SaveOutcome::Fail
            }
            Err(e) => {
                self.fault(
                    "save",
                    json!({ "session_id": session.session_id, "reason": e.to_string() }),
                )
                .await;
                SaveOutcome::Fail
            }
        }
    }

    /// Loads and validates a session.
    ///
    /// Expired records are `NotFound`. A record whose caller version differs
    /// from the stored caller version, or whose caller version record is
    /// gone, is `Outdated`.
    pub async fn load(&self, session_id: &str) -> LoadOutcome {
        if session_id.trim().is_empty() {
            return LoadOutcome::NotFound;
        }

        let payload = match self.store.get(&session_key(session_id)).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return LoadOutcome::NotFound,
            Err(e) => {
                self.fault(
                    "load",
                    json!({ "session_id": session_id, "reason": e.to_string() }),
                )
                .await;
                return LoadOutcome::Fail;
            }
        };

        let session = match Session::from_map(&payload) {
            Ok(session) => session,
            Err(e) => {
                self.fault(
                    "load",
                    json!({ "session_id": session_id, "reason": e.to_string() }),
                )
                .await;
                return LoadOutcome::Fail;
            }
        };

        if session.is_expired() {
            return LoadOutcome::NotFound;
        }

        let Some(caller_id) = session.caller_id.as_deref() else {
            return LoadOutcome::Ok(session);
        };

        match self.store.get(&caller_version_key(caller_id)).await {
            Ok(Some(stored)) if stored.as_u64() == Some(session.caller_version) => {
                LoadOutcome::Ok(session)
            }
            Ok(_) => {
                debug!(session_id, caller_id, "session outdated by caller version");
                LoadOutcome::Outdated
            }
            Err(e) => {
                self.fault(
                    "load",
                    json!({ "caller_id": caller_id, "reason": e.to_string() }),
                )
                .await;
                LoadOutcome::Fail
            }
        }
    }

    /// Records `version` for `caller_id` unless a newer one is stored.
    ///
    /// Safe to call redundantly; an equal stored version only refreshes the
    /// record's TTL.
    pub async fn update_caller_version(&self, caller_id: &str, version: u64) -> SaveOutcome {
        let key = caller_version_key(caller_id);

        match self.store.get(&key).await {
            Ok(Some(stored)) => {
                if let Some(stored) = stored.as_u64() {
                    if stored > version {
                        debug!(caller_id, stored, version, "caller version outdated");
                        return SaveOutcome::Outdated;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.fault(
                    "update_caller_version",
                    json!({ "caller_id": caller_id, "reason": e.to_string() }),
                )
                .await;
                return SaveOutcome::Fail;
            }
        }

        match self.store.set(&key, json!(version), SESSION_TTL).await {
            Ok(true) => SaveOutcome::Ok,
            Ok(false) => {
                self.fault(
                    "update_caller_version",
                    json!({ "caller_id": caller_id, "reason": "store refused write" }),
                )
                .await;
                SaveOutcome::Fail
            }
            Err(e) => {
                self.fault(
                    "update_caller_version",
                    json!({ "caller_id": caller_id, "reason": e.to_string() }),
                )
                .await;
                SaveOutcome::Fail
            }
        }
    }

    /// Removes the session record. Deleting a missing record succeeds.
    pub async fn delete(&self, session: &Session) -> DeleteOutcome {
        match self.store.delete(&session_key(&session.session_id)).await {
            Ok(_) => DeleteOutcome::Ok,
            Err(e) => {
                self.fault(
                    "delete",
                    json!({ "session_id": session.session_id, "reason": e.to_string() }),
                )
                .await;
                DeleteOutcome::Fail
            }
        }
    }

    /// Derives a session for a downstream call.
    ///
    /// Without extra grants the caller's own session is reused. Otherwise a
    /// duplicate with a new id and `extra` layered onto `session.permissions`
    /// is persisted and returned. The caller's default fallback is kept. Storage faults are hard errors since the
    /// downstream call cannot be authorized without the derived record.
    pub async fn augment_with_permissions_for(
        &self,
        session: &Session,
        extra: Option<&Permissions>,
    ) -> Result<Augmentation, SessionError> {
        let Some(extra) = extra else {
            return Ok(Augmentation::Unchanged);
        };

        let Some(caller_id) = session.caller_id.clone() else {
            return Err(SessionError::MissingCallerId {
                session_id: session.session_id.clone(),
            });
        };

        let mut derived = session.duplicate();
        derived.permissions.add_grants(extra);

        match self.save(&mut derived).await {
            SaveOutcome::Ok => Ok(Augmentation::Derived(derived)),
            SaveOutcome::Outdated => Ok(Augmentation::Outdated),
            SaveOutcome::Fail => Err(SessionError::Storage { caller_id }),
        }
    }
}
