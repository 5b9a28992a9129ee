//! Platform error vocabulary.
//!
//! Every error a call can surface is an [`ErrorEntry`] carrying a namespaced
//! code (`platform.*`, `generic.*` or a resource-declared custom code), a
//! human message and an optional reference naming the offending thing.
//! Entries accumulate in an [`ErrorCollection`]; the first entry's status
//! governs the HTTP status of the reply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Well-known error codes.
pub mod codes {
    pub const PLATFORM_NOT_FOUND: &str = "platform.not_found";
    pub const PLATFORM_MALFORMED: &str = "platform.malformed";
    pub const PLATFORM_INVALID_SESSION: &str = "platform.invalid_session";
    pub const PLATFORM_FORBIDDEN: &str = "platform.forbidden";
    pub const PLATFORM_METHOD_NOT_ALLOWED: &str = "platform.method_not_allowed";
    pub const PLATFORM_FAULT: &str = "platform.fault";
    pub const GENERIC_NOT_FOUND: &str = "generic.not_found";
    pub const GENERIC_MALFORMED: &str = "generic.malformed";
    pub const GENERIC_INVALID_PARAMETERS: &str = "generic.invalid_parameters";
    pub const GENERIC_INVALID_REFERENCE: &str = "generic.invalid_reference";
}

/// Status used for codes nobody declared.
pub const UNDECLARED_STATUS: u16 = 500;

/// HTTP status of a built-in code.
pub fn platform_status(code: &str) -> Option<u16> {
    let status = match code {
        codes::PLATFORM_NOT_FOUND | codes::GENERIC_NOT_FOUND => 404,
        codes::PLATFORM_MALFORMED
        | codes::GENERIC_MALFORMED
        | codes::GENERIC_INVALID_PARAMETERS
        | codes::GENERIC_INVALID_REFERENCE => 422,
        codes::PLATFORM_INVALID_SESSION => 401,
        codes::PLATFORM_FORBIDDEN => 403,
        codes::PLATFORM_METHOD_NOT_ALLOWED => 405,
        codes::PLATFORM_FAULT => 500,
        _ => return None,
    };
    Some(status)
}

/// Status for `code`, consulting built-ins first, then `custom`.
pub fn status_for(code: &str, custom: &BTreeMap<String, u16>) -> u16 {
    platform_status(code)
        .or_else(|| custom.get(code).copied())
        .unwrap_or(UNDECLARED_STATUS)
}

/// One error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip, default = "undeclared_status")]
    pub status: u16,
}

fn undeclared_status() -> u16 {
    UNDECLARED_STATUS
}

impl ErrorEntry {
    /// Creates an entry whose status comes from the built-in table.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let status = platform_status(&code).unwrap_or(UNDECLARED_STATUS);
        Self {
            code,
            message: message.into(),
            reference: None,
            status,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

/// Ordered collection of errors for one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorCollection {
    entries: Vec<ErrorEntry>,
    custom: BTreeMap<String, u16>,
}

impl ErrorCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collection that also knows a resource's custom codes.
    pub fn with_custom(custom: BTreeMap<String, u16>) -> Self {
        Self {
            entries: Vec::new(),
            custom,
        }
    }

    /// Registers further custom codes.
    pub fn declare(&mut self, custom: &BTreeMap<String, u16>) {
        self.custom
            .extend(custom.iter().map(|(code, status)| (code.clone(), *status)));
    }

    pub fn add(&mut self, code: &str, message: impl Into<String>) -> &mut Self {
        self.push(ErrorEntry::new(code, message))
    }

    pub fn add_with_reference(
        &mut self,
        code: &str,
        message: impl Into<String>,
        reference: impl Into<String>,
    ) -> &mut Self {
        self.push(ErrorEntry::new(code, message).with_reference(reference))
    }

    /// Appends an entry, resolving declared custom codes to their status.
    pub fn push(&mut self, mut entry: ErrorEntry) -> &mut Self {
        if platform_status(&entry.code).is_none() {
            if let Some(status) = self.custom.get(&entry.code) {
                entry.status = *status;
            }
        }
        self.entries.push(entry);
        self
    }

    /// Moves every entry of `other` into this collection.
    pub fn merge(&mut self, other: ErrorCollection) -> &mut Self {
        for entry in other.entries {
            self.push(entry);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.entries.iter().any(|e| e.code == code)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Status of the first entry.
    pub fn first_status(&self) -> Option<u16> {
        self.entries.first().map(|e| e.status)
    }

    /// Error payload: `{"errors":[...],"kind":"Errors","interaction_id":..}`.
    pub fn to_value(&self, interaction_id: &str) -> Value {
        json!({
            "errors": self.entries,
            "kind": "Errors",
            "interaction_id": interaction_id,
        })
    }

    /// Reads an error payload returned by a remote peer.
    ///
    /// Built-in codes get their own status; anything else takes
    /// `reply_status`, the HTTP status the peer answered with. Returns `None`
    /// when the payload carries no `errors` array.
    pub fn from_value(payload: &Value, reply_status: u16) -> Option<Self> {
        let errors = payload.get("errors")?.as_array()?;
        let mut collection = Self::new();
        for raw in errors {
            let Ok(entry) = serde_json::from_value::<ErrorEntry>(raw.clone()) else {
                collection.push(
                    ErrorEntry::new(codes::PLATFORM_FAULT, "Unreadable downstream error")
                        .with_reference(raw.to_string()),
                );
                continue;
            };
            let status = platform_status(&entry.code).unwrap_or(reply_status);
            collection.push(entry.with_status(status));
        }
        Some(collection)
    }

    /// Remaps errors returned by a downstream `resource` into the calling
    /// resource's vocabulary.
    ///
    /// * not-found becomes `generic.invalid_reference` naming the target;
    /// * `platform.malformed` becomes `generic.invalid_parameters`;
    /// * `platform.method_not_allowed` becomes `platform.fault`;
    /// * everything else passes through with the reference annotated.
    pub fn translate_downstream(&self, resource: &str, ident: Option<&str>) -> ErrorCollection {
        let annotate = |reference: &Option<String>| match reference {
            Some(r) if !r.is_empty() => format!("{resource}: {r}"),
            _ => resource.to_string(),
        };

        let mut translated = ErrorCollection::with_custom(self.custom.clone());
        for entry in &self.entries {
            let mapped = match entry.code.as_str() {
                codes::PLATFORM_NOT_FOUND | codes::GENERIC_NOT_FOUND => {
                    let target = match ident {
                        Some(ident) => format!("{resource} {ident}"),
                        None => resource.to_string(),
                    };
                    ErrorEntry::new(
                        codes::GENERIC_INVALID_REFERENCE,
                        format!("Referenced {target} not found"),
                    )
                    .with_reference(target)
                }
                codes::PLATFORM_MALFORMED => ErrorEntry::new(
                    codes::GENERIC_INVALID_PARAMETERS,
                    entry.message.clone(),
                )
                .with_reference(annotate(&entry.reference)),
                codes::PLATFORM_METHOD_NOT_ALLOWED => ErrorEntry::new(
                    codes::PLATFORM_FAULT,
                    format!("Inter-resource call to {resource} used an unsupported action"),
                )
                .with_reference(annotate(&entry.reference)),
                _ => ErrorEntry {
                    reference: Some(annotate(&entry.reference)),
                    ..entry.clone()
                },
            };
            translated.push(mapped);
        }
        translated
    }
}

impl IntoIterator for ErrorCollection {
    type Item = ErrorEntry;
    type IntoIter = std::vec::IntoIter<ErrorEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
