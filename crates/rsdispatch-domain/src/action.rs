//! The fixed action set every resource endpoint draws from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// One of the five resource actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    List,
    Show,
    Create,
    Update,
    Delete,
}

impl Action {
    /// All actions in declaration order.
    pub const ALL: [Action; 5] = [
        Action::List,
        Action::Show,
        Action::Create,
        Action::Update,
        Action::Delete,
    ];

    /// Canonical lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Show => "show",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    /// Maps an HTTP verb plus "has path identifier" to an action.
    ///
    /// `GET` is `show` with an identifier and `list` without. Returns `None`
    /// for verbs that do not map to any action.
    pub fn from_http(method: &str, has_ident: bool) -> Option<Action> {
        match method.to_ascii_uppercase().as_str() {
            "GET" if has_ident => Some(Action::Show),
            "GET" => Some(Action::List),
            "POST" => Some(Action::Create),
            "PATCH" => Some(Action::Update),
            "DELETE" => Some(Action::Delete),
            _ => None,
        }
    }

    /// HTTP verb used when calling this action on a remote endpoint.
    pub fn http_method(&self) -> &'static str {
        match self {
            Action::List | Action::Show => "GET",
            Action::Create => "POST",
            Action::Update => "PATCH",
            Action::Delete => "DELETE",
        }
    }

    /// True for actions that address one entity through a path identifier.
    pub fn requires_ident(&self) -> bool {
        matches!(self, Action::Show | Action::Update | Action::Delete)
    }

    /// True for actions that carry a request body.
    pub fn takes_body(&self) -> bool {
        matches!(self, Action::Create | Action::Update)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DomainError::UnknownAction {
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_mapping() {
        assert_eq!(Action::from_http("GET", false), Some(Action::List));
        assert_eq!(Action::from_http("get", true), Some(Action::Show));
        assert_eq!(Action::from_http("POST", false), Some(Action::Create));
        assert_eq!(Action::from_http("PATCH", true), Some(Action::Update));
        assert_eq!(Action::from_http("DELETE", true), Some(Action::Delete));
        assert_eq!(Action::from_http("PUT", true), None);
        assert_eq!(Action::from_http("OPTIONS", false), None);
    }

    #[test]
    fn test_parse_and_display_agree() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
            assert_eq!(action.to_string(), action.as_str());
        }
        assert!("destroy".parse::<Action>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Action::Update).unwrap();
        assert_eq!(json, "\"update\"");
        let back: Action = serde_json::from_str("\"list\"").unwrap();
        assert_eq!(back, Action::List);
    }
}
