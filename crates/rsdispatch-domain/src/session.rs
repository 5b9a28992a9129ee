//! Session model.
//!
//! A session is the identity and capability context of one authenticated
//! party: who is calling, what they may do (a [`Permissions`] tree), what
//! data they may see (`scoping`), and when it stops being valid.
//!
//! Persistence lives in the server crate's session manager; this module only
//! defines the value and its canonical map form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DomainError, DomainResult};
use crate::permissions::Permissions;

/// Session id of the built-in test session.
pub const TEST_SESSION_ID: &str = "01234567890123456789012345678901";

/// Caller id of the built-in test session.
pub const TEST_SESSION_CALLER_ID: &str = "c5ea12fb7f414a46850e73ee1bf6d95e";

/// Generates a fresh session id (32 lower-case hex characters).
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A caller session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique token presented in the session header.
    pub session_id: String,
    /// External caller record this session was minted for.
    #[serde(default)]
    pub caller_id: Option<String>,
    /// Caller record version at minting time.
    #[serde(default)]
    pub caller_version: u64,
    /// Open map of identity claims.
    #[serde(default)]
    pub identity: Map<String, Value>,
    /// What the caller may do.
    #[serde(default)]
    pub permissions: Permissions,
    /// Open map consumed by downstream data-access policies.
    #[serde(default)]
    pub scoping: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    /// Set only once the session has been persisted.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates an empty session with a fresh id and deny-all permissions.
    pub fn new() -> Self {
        Self {
            session_id: generate_session_id(),
            caller_id: None,
            caller_version: 0,
            identity: Map::new(),
            permissions: Permissions::new(),
            scoping: Map::new(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Creates a session for a caller at the given caller version.
    pub fn for_caller(caller_id: impl Into<String>, caller_version: u64) -> Self {
        Self {
            caller_id: Some(caller_id.into()),
            caller_version,
            ..Self::new()
        }
    }

    /// The session substituted when test-session fallback is enabled.
    ///
    /// It allows every action on every resource.
    pub fn test_session() -> Self {
        let mut scoping = Map::new();
        scoping.insert("authorised_http_headers".to_string(), Value::Array(Vec::new()));
        Self {
            session_id: TEST_SESSION_ID.to_string(),
            caller_id: Some(TEST_SESSION_CALLER_ID.to_string()),
            caller_version: 1,
            identity: Map::new(),
            permissions: Permissions::allow_all(),
            scoping,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Sets the permission tree.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Adds an identity claim.
    pub fn with_identity(mut self, key: impl Into<String>, value: Value) -> Self {
        self.identity.insert(key.into(), value);
        self
    }

    /// Adds a scoping entry.
    pub fn with_scoping(mut self, key: impl Into<String>, value: Value) -> Self {
        self.scoping.insert(key.into(), value);
        self
    }

    /// True once `expires_at` has passed at `now`. Unpersisted sessions
    /// never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// True once `expires_at` has passed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Copies this session under a new id, clearing expiry so the copy must
    /// be persisted on its own.
    pub fn duplicate(&self) -> Self {
        Self {
            session_id: generate_session_id(),
            created_at: Utc::now(),
            expires_at: None,
            ..self.clone()
        }
    }

    /// Serializes the session into its canonical map form.
    pub fn to_map(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Restores a session from its map form.
    pub fn from_map(map: &Value) -> DomainResult<Self> {
        let session: Session =
            serde_json::from_value(map.clone()).map_err(|e| DomainError::InvalidSession {
                message: e.to_string(),
            })?;
        if session.session_id.is_empty() {
            return Err(DomainError::InvalidSession {
                message: "session_id cannot be empty".to_string(),
            });
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::permissions::Verdict;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_new_sessions_have_distinct_ids() {
        let a = Session::new();
        let b = Session::new();
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(a.session_id.len(), 32);
    }

    #[test]
    fn test_map_round_trip_preserves_behaviour() {
        let mut permissions = Permissions::new();
        permissions.set_resource("Widget", Action::List, Verdict::Allow);

        let mut session = Session::for_caller("caller-1", 4)
            .with_permissions(permissions)
            .with_identity("user_id", json!("u-42"))
            .with_scoping("tenant", json!("acme"));
        session.expires_at = Some(Utc::now() + Duration::hours(1));

        let restored = Session::from_map(&session.to_map()).unwrap();

        assert_eq!(restored, session);
        assert_eq!(
            restored.permissions.permitted("Widget", Action::List),
            Verdict::Allow
        );
        assert_eq!(
            restored.permissions.permitted("Widget", Action::Delete),
            Verdict::Deny
        );
        assert!(!restored.is_expired());
        assert_eq!(restored.identity["user_id"], json!("u-42"));
    }

    #[test]
    fn test_expiry() {
        let mut session = Session::new();
        assert!(!session.is_expired());

        session.expires_at = Some(Utc::now() - Duration::seconds(1));
        assert!(session.is_expired());
    }

    #[test]
    fn test_duplicate_gets_new_id_and_no_expiry() {
        let mut session = Session::for_caller("caller-1", 2);
        session.expires_at = Some(Utc::now() + Duration::hours(1));

        let copy = session.duplicate();
        assert_ne!(copy.session_id, session.session_id);
        assert_eq!(copy.caller_id, session.caller_id);
        assert_eq!(copy.caller_version, 2);
        assert!(copy.expires_at.is_none());
    }

    #[test]
    fn test_test_session_allows_everything() {
        let session = Session::test_session();
        assert_eq!(session.session_id, TEST_SESSION_ID);
        for action in Action::ALL {
            assert_eq!(session.permissions.permitted("Anything", action), Verdict::Allow);
        }
    }

    #[test]
    fn test_from_map_rejects_garbage() {
        assert!(Session::from_map(&json!({"session_id": 7})).is_err());
        assert!(Session::from_map(&json!("nope")).is_err());
        assert!(Session::from_map(&json!({
            "session_id": "",
            "created_at": "2024-01-15T10:30:00Z"
        }))
        .is_err());
    }
}
