//! Resource descriptors.
//!
//! A [`ResourceDescriptor`] is the immutable, declarative contract of one
//! resource version: where it lives (`/v{version}/{endpoint}`), which actions
//! it supports, which of those need no session, how list queries may be
//! shaped, which custom error codes it may emit, and which extra permissions
//! it grants to downstream resources when it calls them.
//!
//! # Example
//!
//! ```
//! use rsdispatch_domain::{Action, ResourceDescriptor};
//!
//! let widget = ResourceDescriptor::builder("Widget", "widgets")
//!     .actions([Action::List, Action::Show])
//!     .sort_key("name", ["asc", "desc"])
//!     .search(["name"])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(widget.path_prefix(), "/v1/widgets");
//! assert!(widget.supports(Action::Show));
//! assert!(!widget.supports(Action::Delete));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::action::Action;
use crate::error::{DomainError, DomainResult};
use crate::platform_errors::ErrorEntry;
use crate::permissions::Permissions;

/// Default page size when a resource does not declare one.
pub const DEFAULT_LIMIT: u64 = 50;

/// Sort key every resource supports.
pub const DEFAULT_SORT_KEY: &str = "created_at";

/// External body validator (schema / presenter subsystem).
///
/// An empty result means the body passed.
pub trait BodyValidator: Send + Sync {
    /// Validates a create or update body.
    fn validate(&self, action: Action, body: &Value) -> Vec<ErrorEntry>;
}

/// List query rules of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRules {
    /// Page size when the query gives no `limit`.
    pub default_limit: u64,
    /// Sort key -> allowed directions; the first direction is the default.
    pub sort: BTreeMap<String, Vec<String>>,
    /// Sort key used when the query gives no `sort`.
    pub default_sort_key: String,
    /// Keys accepted inside `search`.
    pub search: BTreeSet<String>,
    /// Keys accepted inside `filter`.
    pub filter: BTreeSet<String>,
}

impl Default for ListRules {
    fn default() -> Self {
        let mut sort = BTreeMap::new();
        sort.insert(
            DEFAULT_SORT_KEY.to_string(),
            vec!["desc".to_string(), "asc".to_string()],
        );
        Self {
            default_limit: DEFAULT_LIMIT,
            sort,
            default_sort_key: DEFAULT_SORT_KEY.to_string(),
            search: BTreeSet::new(),
            filter: BTreeSet::new(),
        }
    }
}

impl ListRules {
    /// Default direction for `key`, if `key` is sortable.
    pub fn default_direction(&self, key: &str) -> Option<&str> {
        self.sort
            .get(key)
            .and_then(|directions| directions.first())
            .map(String::as_str)
    }

    /// True if `direction` is allowed for `key`.
    pub fn allows_direction(&self, key: &str, direction: &str) -> bool {
        self.sort
            .get(key)
            .is_some_and(|directions| directions.iter().any(|d| d == direction))
    }
}

/// Immutable description of one resource version.
#[derive(Clone)]
pub struct ResourceDescriptor {
    name: String,
    version: u32,
    endpoint: String,
    actions: BTreeSet<Action>,
    public_actions: BTreeSet<Action>,
    list: ListRules,
    embeds: BTreeSet<String>,
    errors: BTreeMap<String, u16>,
    additional_permissions: BTreeMap<Action, Permissions>,
    validator: Option<Arc<dyn BodyValidator>>,
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("endpoint", &self.endpoint)
            .field("actions", &self.actions)
            .field("public_actions", &self.public_actions)
            .field("list", &self.list)
            .field("embeds", &self.embeds)
            .field("errors", &self.errors)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

impl ResourceDescriptor {
    /// Starts a descriptor for `name` served at `endpoint`.
    pub fn builder(
        name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> ResourceDescriptorBuilder {
        ResourceDescriptorBuilder::new(name, endpoint)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `/v{version}/{endpoint}`.
    pub fn path_prefix(&self) -> String {
        format!("/v{}/{}", self.version, self.endpoint)
    }

    pub fn actions(&self) -> &BTreeSet<Action> {
        &self.actions
    }

    pub fn supports(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    pub fn public_actions(&self) -> &BTreeSet<Action> {
        &self.public_actions
    }

    pub fn is_public(&self, action: Action) -> bool {
        self.public_actions.contains(&action)
    }

    pub fn list_rules(&self) -> &ListRules {
        &self.list
    }

    pub fn embeds(&self) -> &BTreeSet<String> {
        &self.embeds
    }

    /// Status for a custom error code declared by this resource.
    pub fn custom_error_status(&self, code: &str) -> Option<u16> {
        self.errors.get(code).copied()
    }

    pub fn custom_errors(&self) -> &BTreeMap<String, u16> {
        &self.errors
    }

    /// Extra permissions granted to downstream calls made while handling
    /// `action`.
    pub fn additional_permissions_for(&self, action: Action) -> Option<&Permissions> {
        self.additional_permissions.get(&action)
    }

    pub fn validator(&self) -> Option<&Arc<dyn BodyValidator>> {
        self.validator.as_ref()
    }
}

/// Builder for [`ResourceDescriptor`].
pub struct ResourceDescriptorBuilder {
    name: String,
    version: u32,
    endpoint: String,
    actions: BTreeSet<Action>,
    public_actions: BTreeSet<Action>,
    list: ListRules,
    embeds: BTreeSet<String>,
    errors: BTreeMap<String, u16>,
    additional_permissions: BTreeMap<Action, Permissions>,
    validator: Option<Arc<dyn BodyValidator>>,
}

impl ResourceDescriptorBuilder {
    fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            endpoint: endpoint.into(),
            actions: Action::ALL.into_iter().collect(),
            public_actions: BTreeSet::new(),
            list: ListRules::default(),
            embeds: BTreeSet::new(),
            errors: BTreeMap::new(),
            additional_permissions: BTreeMap::new(),
            validator: None,
        }
    }

    /// Major version (default 1).
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Restricts the supported actions (default: all five).
    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions = actions.into_iter().collect();
        self
    }

    /// Actions callable without a session.
    pub fn public_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.public_actions = actions.into_iter().collect();
        self
    }

    pub fn default_limit(mut self, limit: u64) -> Self {
        self.list.default_limit = limit;
        self
    }

    /// Declares a sort key; the first direction is its default.
    pub fn sort_key<I, S>(mut self, key: impl Into<String>, directions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.list
            .sort
            .insert(key.into(), directions.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_sort(mut self, key: impl Into<String>) -> Self {
        self.list.default_sort_key = key.into();
        self
    }

    pub fn search<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.list.search.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn filter<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.list.filter.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Names accepted by `_embed` and `_reference`.
    pub fn embeds<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.embeds.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declares a custom error code and its HTTP status.
    pub fn error(mut self, code: impl Into<String>, status: u16) -> Self {
        self.errors.insert(code.into(), status);
        self
    }

    /// Extra permissions granted to downstream calls made during `action`.
    ///
    /// Stored as grants only; a default fallback on `permissions` is dropped.
    pub fn additional_permissions(mut self, action: Action, mut permissions: Permissions) -> Self {
        permissions.clear_default_fallback();
        self.additional_permissions.insert(action, permissions);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn BodyValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Validates the declarations and builds the descriptor.
    pub fn build(self) -> DomainResult<ResourceDescriptor> {
        let invalid = |message: String| DomainError::InvalidDescriptor {
            resource: self.name.clone(),
            message,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("resource name cannot be empty".to_string()));
        }
        if self.version == 0 {
            return Err(invalid("version must be at least 1".to_string()));
        }
        if self.endpoint.is_empty()
            || !self
                .endpoint
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid(format!(
                "endpoint '{}' must be a single path segment of [A-Za-z0-9_-]",
                self.endpoint
            )));
        }
        if self.actions.is_empty() {
            return Err(invalid("at least one action must be supported".to_string()));
        }
        if let Some(action) = self.public_actions.difference(&self.actions).next() {
            return Err(invalid(format!(
                "public action '{action}' is not a supported action"
            )));
        }
        if let Some(action) = self
            .additional_permissions
            .keys()
            .find(|a| !self.actions.contains(a))
        {
            return Err(invalid(format!(
                "additional permissions declared for unsupported action '{action}'"
            )));
        }
        if let Some((key, _)) = self.list.sort.iter().find(|(_, d)| d.is_empty()) {
            return Err(invalid(format!("sort key '{key}' declares no directions")));
        }
        if !self.list.sort.contains_key(&self.list.default_sort_key) {
            return Err(invalid(format!(
                "default sort key '{}' is not a declared sort key",
                self.list.default_sort_key
            )));
        }
        if self.list.default_limit == 0 {
            return Err(invalid("default limit must be positive".to_string()));
        }
        if let Some((code, status)) = self
            .errors
            .iter()
            .find(|(code, status)| !code.contains('.') || !(400..600).contains(*status))
        {
            return Err(invalid(format!(
                "custom error '{code}' (status {status}) must be namespaced and use a 4xx/5xx status"
            )));
        }

        Ok(ResourceDescriptor {
            name: self.name,
            version: self.version,
            endpoint: self.endpoint,
            actions: self.actions,
            public_actions: self.public_actions,
            list: self.list,
            embeds: self.embeds,
            errors: self.errors,
            additional_permissions: self.additional_permissions,
            validator: self.validator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Verdict;

    #[test]
    fn test_defaults() {
        let descriptor = ResourceDescriptor::builder("Widget", "widgets").build().unwrap();

        assert_eq!(descriptor.version(), 1);
        assert_eq!(descriptor.actions().len(), 5);
        assert!(descriptor.public_actions().is_empty());
        assert_eq!(descriptor.list_rules().default_limit, DEFAULT_LIMIT);
        assert_eq!(descriptor.list_rules().default_direction("created_at"), Some("desc"));
        assert!(descriptor.list_rules().allows_direction("created_at", "asc"));
        assert!(!descriptor.list_rules().allows_direction("created_at", "up"));
    }

    #[test]
    fn test_version_and_prefix() {
        let descriptor = ResourceDescriptor::builder("Widget", "widgets")
            .version(2)
            .build()
            .unwrap();
        assert_eq!(descriptor.path_prefix(), "/v2/widgets");
    }

    #[test]
    fn test_public_actions_must_be_supported() {
        let mut denying = Permissions::new();
        denying.set_resource("Gadget", Action::Show, Verdict::Allow);
        let descriptor = ResourceDescriptor::builder("Widget", "widgets")
            .additional_permissions(Action::Show, denying)
            .build()
            .unwrap();
        let stored = descriptor.additional_permissions_for(Action::Show).unwrap();
        assert_eq!(stored.default_rules().fallback, None);
        assert_eq!(stored, &extra);

        let result = ResourceDescriptor::builder("Widget", "widgets")
            .actions([Action::List])
            .public_actions([Action::Show])
            .build();
        assert!(matches!(result, Err(DomainError::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_default_sort_must_be_declared() {
        let result = ResourceDescriptor::builder("Widget", "widgets")
            .default_sort("name")
            .build();
        assert!(result.is_err());

        let descriptor = ResourceDescriptor::builder("Widget", "widgets")
            .sort_key("name", ["asc"])
            .default_sort("name")
            .build()
            .unwrap();
        assert_eq!(descriptor.list_rules().default_sort_key, "name");
    }

    #[test]
    fn test_endpoint_must_be_single_segment() {
        assert!(ResourceDescriptor::builder("Widget", "a/b").build().is_err());
        assert!(ResourceDescriptor::builder("Widget", "").build().is_err());
        assert!(ResourceDescriptor::builder("Widget", "widgets.json").build().is_err());
    }

    #[test]
    fn test_custom_errors() {
        let descriptor = ResourceDescriptor::builder("Widget", "widgets")
            .error("widget.too_heavy", 422)
            .build()
            .unwrap();
        assert_eq!(descriptor.custom_error_status("widget.too_heavy"), Some(422));
        assert_eq!(descriptor.custom_error_status("widget.other"), None);

        assert!(ResourceDescriptor::builder("Widget", "widgets")
            .error("too_heavy", 422)
            .build()
            .is_err());
        assert!(ResourceDescriptor::builder("Widget", "widgets")
            .error("widget.ok", 200)
            .build()
            .is_err());
    }

    #[test]
    fn test_additional_permissions() {
        let mut extra = Permissions::grants();
        extra.set_resource("Gadget", Action::Show, Verdict::Allow);

        let descriptor = ResourceDescriptor::builder("Widget", "widgets")
            .additional_permissions(Action::Show, extra.clone())
            .build()
            .unwrap();

        assert_eq!(descriptor.additional_permissions_for(Action::Show), Some(&extra));
        assert_eq!(descriptor.additional_permissions_for(Action::List), None);

        let mut denying = Permissions::new();
        denying.set_resource("Gadget", Action::Show, Verdict::Allow);
        let descriptor = ResourceDescriptor::builder("Widget", "widgets")
            .additional_permissions(Action::Show, denying)
            .build()
            .unwrap();
        let stored = descriptor.additional_permissions_for(Action::Show).unwrap();
        assert_eq!(stored.default_rules().fallback, None);
        assert_eq!(stored, &extra);

        let result = ResourceDescriptor::builder("Widget", "widgets")
            .actions([Action::List])
            .additional_permissions(Action::Show, extra)
            .build();
        assert!(result.is_err());
    }
}
