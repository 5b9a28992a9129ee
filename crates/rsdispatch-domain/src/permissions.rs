//! Tri-state permission engine.
//!
//! A permission tree has a `default` node and per-resource nodes. Each node
//! holds an optional fallback verdict (`else`) and an action -> verdict map.
//!
//! # Resolution order
//!
//! For `(resource, action)`:
//!
//! 1. `resources[resource].actions[action]`
//! 2. `resources[resource].else`
//! 3. `default.actions[action]`
//! 4. `default.else`
//! 5. [`Verdict::Deny`]
//!
//! A resource node with neither a matching action nor a fallback falls
//! through to the default node exactly as if it did not exist.
//!
//! # Map form
//!
//! ```json
//! {
//!   "default":   { "else": "deny", "actions": { "list": "allow" } },
//!   "resources": { "Widget": { "else": "ask", "actions": { "delete": "deny" } } }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::Action;
use crate::error::{DomainError, DomainResult};

/// Permission verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Deny,
    /// Defer to the target resource's own verification hook.
    Ask,
}

impl Verdict {
    /// Canonical lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Deny => "deny",
            Verdict::Ask => "ask",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Verdict::Allow),
            "deny" => Ok(Verdict::Deny),
            "ask" => Ok(Verdict::Ask),
            _ => Err(DomainError::UnknownVerdict {
                value: s.to_string(),
            }),
        }
    }
}

/// Verdicts for one node of the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRules {
    /// Verdict for any action without an explicit entry.
    #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Verdict>,
    /// Per-action verdicts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<Action, Verdict>,
}

impl PermissionRules {
    fn lookup(&self, action: Action) -> Option<Verdict> {
        self.actions.get(&action).copied().or(self.fallback)
    }

    fn merge(&mut self, other: &PermissionRules) {
        if let Some(fallback) = other.fallback {
            self.fallback = Some(fallback);
        }
        for (action, verdict) in &other.actions {
            self.actions.insert(*action, *verdict);
        }
    }
}

/// A permission tree.
///
/// [`Permissions::new`] (and `Default`) start with a default fallback of
/// [`Verdict::Deny`], so an untouched tree denies everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    default: PermissionRules,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    resources: BTreeMap<String, PermissionRules>,
}

impl Default for Permissions {
    fn default() -> Self {
        Self::new()
    }
}

impl Permissions {
    /// Creates a tree that denies everything.
    pub fn new() -> Self {
        let mut permissions = Self {
            default: PermissionRules::default(),
            resources: BTreeMap::new(),
        };
        permissions.set_default_fallback(Verdict::Deny);
        permissions
    }

    /// Creates an empty tree with no default fallback.
    ///
    /// Used for extra grants layered onto an existing tree, where a fallback
    /// would override the base tree's own.
    pub fn grants() -> Self {
        Self {
            default: PermissionRules::default(),
            resources: BTreeMap::new(),
        }
    }

    /// Creates a tree that allows everything. Used for test sessions.
    pub fn allow_all() -> Self {
        let mut permissions = Self::new();
        permissions.set_default_fallback(Verdict::Allow);
        permissions
    }

    /// Sets the default verdict for `action` on any resource.
    pub fn set_default(&mut self, action: Action, verdict: Verdict) -> &mut Self {
        self.default.actions.insert(action, verdict);
        self
    }

    /// Sets the verdict for any action on any resource lacking a closer match.
    pub fn set_default_fallback(&mut self, verdict: Verdict) -> &mut Self {
        self.default.fallback = Some(verdict);
        self
    }

    /// Removes the default fallback. Resolution then ends in
    /// [`Verdict::Deny`] when nothing else matches.
    pub fn clear_default_fallback(&mut self) -> &mut Self {
        self.default.fallback = None;
        self
    }

    /// Sets the verdict for `action` on `resource`.
    pub fn set_resource(
        &mut self,
        resource: impl Into<String>,
        action: Action,
        verdict: Verdict,
    ) -> &mut Self {
        self.resources
            .entry(resource.into())
            .or_default()
            .actions
            .insert(action, verdict);
        self
    }

    /// Sets the verdict for any action on `resource` without an explicit entry.
    pub fn set_resource_fallback(
        &mut self,
        resource: impl Into<String>,
        verdict: Verdict,
    ) -> &mut Self {
        self.resources.entry(resource.into()).or_default().fallback = Some(verdict);
        self
    }

    /// Resolves the verdict for `(resource, action)`.
    pub fn permitted(&self, resource: &str, action: Action) -> Verdict {
        self.resources
            .get(resource)
            .and_then(|rules| rules.lookup(action))
            .or_else(|| self.default.lookup(action))
            .unwrap_or(Verdict::Deny)
    }

    /// Merges `other` into this tree; entries in `other` win on conflict.
    pub fn merge(&mut self, other: &Permissions) -> &mut Self {
        self.default.merge(&other.default);
        for (resource, rules) in &other.resources {
            self.resources
                .entry(resource.clone())
                .or_default()
                .merge(rules);
        }
        self
    }

    /// Layers `grants` onto this tree.
    ///
    /// Like [`merge`](Self::merge), except that the default fallback of
    /// `grants` is ignored: this tree's own `default.else` always survives.
    pub fn add_grants(&mut self, grants: &Permissions) -> &mut Self {
        let mut grants = grants.clone();
        grants.clear_default_fallback();
        self.merge(&grants)
    }

    /// The default node.
    pub fn default_rules(&self) -> &PermissionRules {
        &self.default
    }

    /// The node for `resource`, if any.
    pub fn resource_rules(&self, resource: &str) -> Option<&PermissionRules> {
        self.resources.get(resource)
    }

    /// Serializes the tree into its canonical map form.
    pub fn to_map(&self) -> Value {
        // Enum keys and string fields always serialize.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Restores a tree from its map form.
    pub fn from_map(map: &Value) -> DomainResult<Self> {
        if !map.is_object() {
            return Err(DomainError::InvalidPermissions {
                message: "expected an object".to_string(),
            });
        }
        serde_json::from_value(map.clone()).map_err(|e| DomainError::InvalidPermissions {
            message: e.to_string(),
        })
    }
}
