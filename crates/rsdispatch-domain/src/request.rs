//! Parsed inbound request.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::descriptor::ListRules;

/// List query parameters after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParameters {
    pub offset: u64,
    pub limit: u64,
    /// `(key, direction)` pairs in priority order.
    pub sort_data: Vec<(String, String)>,
    pub search_data: BTreeMap<String, String>,
    pub filter_data: BTreeMap<String, String>,
}

impl Default for ListParameters {
    fn default() -> Self {
        Self::from_rules(&ListRules::default())
    }
}

impl ListParameters {
    /// Defaults declared by a resource's list rules.
    pub fn from_rules(rules: &ListRules) -> Self {
        let key = rules.default_sort_key.clone();
        let direction = rules.default_direction(&key).unwrap_or("desc").to_string();
        Self {
            offset: 0,
            limit: rules.default_limit,
            sort_data: vec![(key, direction)],
            search_data: BTreeMap::new(),
            filter_data: BTreeMap::new(),
        }
    }

    /// Logged form of the parameters.
    pub fn to_value(&self) -> Value {
        let sort: Vec<Value> = self
            .sort_data
            .iter()
            .map(|(key, direction)| json!({ "key": key, "direction": direction }))
            .collect();
        json!({
            "offset": self.offset,
            "limit": self.limit,
            "sort": sort,
            "search": self.search_data,
            "filter": self.filter_data,
        })
    }
}

/// Request half of a call's context.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub locale: String,
    /// Parsed body; present only for create and update.
    pub body: Option<Value>,
    /// Path segments after the endpoint.
    pub path_components: Vec<String>,
    /// Path extension without the leading dot, e.g. `tar.gz`.
    pub extension: Option<String>,
    pub list: ListParameters,
    pub embeds: Vec<String>,
    pub references: Vec<String>,
    /// Request headers with lower-case names.
    pub headers: BTreeMap<String, String>,
}

impl Request {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            body: None,
            path_components: Vec::new(),
            extension: None,
            list: ListParameters::default(),
            embeds: Vec::new(),
            references: Vec::new(),
            headers: BTreeMap::new(),
        }
    }

    /// First path component.
    pub fn ident(&self) -> Option<&str> {
        self.path_components.first().map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Splits the path remainder after `/v{N}/{endpoint}` into path components
/// and extension.
///
/// A remainder beginning with `.` is pure extension (`/v1/widgets.tar.gz`).
/// Otherwise the remainder is split on `/` and the last component loses
/// everything after its first `.` to the extension (`/42.json`).
pub fn split_path_remainder(remainder: &str) -> (Vec<String>, Option<String>) {
    if let Some(extension) = remainder.strip_prefix('.') {
        let extension = (!extension.is_empty()).then(|| extension.to_string());
        return (Vec::new(), extension);
    }

    let mut components: Vec<String> = remainder
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();

    let mut extension = None;
    if let Some(last) = components.last_mut() {
        if let Some((stem, ext)) = last.split_once('.') {
            if !ext.is_empty() {
                extension = Some(ext.to_string());
            }
            *last = stem.to_string();
        }
        if last.is_empty() {
            components.pop();
        }
    }

    (components, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ident_with_extension() {
        let (components, extension) = split_path_remainder("/42.json");
        assert_eq!(components, vec!["42"]);
        assert_eq!(extension.as_deref(), Some("json"));
    }

    #[test]
    fn test_split_pure_extension() {
        let (components, extension) = split_path_remainder(".tar.gz");
        assert!(components.is_empty());
        assert_eq!(extension.as_deref(), Some("tar.gz"));
    }

    #[test]
    fn test_split_nested_components() {
        let (components, extension) = split_path_remainder("/42/parts/7.tar.gz");
        assert_eq!(components, vec!["42", "parts", "7"]);
        assert_eq!(extension.as_deref(), Some("tar.gz"));
    }

    #[test]
    fn test_split_empty_and_trailing_slash() {
        assert_eq!(split_path_remainder(""), (Vec::new(), None));
        assert_eq!(split_path_remainder("/"), (Vec::new(), None));
        assert_eq!(
            split_path_remainder("/42/"),
            (vec!["42".to_string()], None)
        );
    }

    #[test]
    fn test_ident_is_first_component() {
        let mut request = Request::new("en-nz");
        assert_eq!(request.ident(), None);

        request.path_components = vec!["42".into(), "parts".into()];
        assert_eq!(request.ident(), Some("42"));
    }

    #[test]
    fn test_list_defaults_follow_rules() {
        let params = ListParameters::default();
        assert_eq!(params.offset, 0);
        assert_eq!(params.limit, 50);
        assert_eq!(
            params.sort_data,
            vec![("created_at".to_string(), "desc".to_string())]
        );

        let logged = params.to_value();
        assert_eq!(logged["limit"], 50);
        assert_eq!(logged["sort"][0]["key"], "created_at");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut request = Request::new("en-nz");
        request
            .headers
            .insert("x-custom".to_string(), "yes".to_string());
        assert_eq!(request.header("X-Custom"), Some("yes"));
    }
}
