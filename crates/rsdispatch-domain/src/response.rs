//! Outcome holder for one call.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::platform_errors::{codes, ErrorCollection};

/// Response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseBody {
    #[default]
    Empty,
    Object(Map<String, Value>),
    /// A page of a list, optionally annotated with the unpaginated size.
    Array {
        items: Vec<Value>,
        dataset_size: Option<u64>,
    },
}

impl ResponseBody {
    /// Wire form; `None` for an empty body.
    ///
    /// Arrays become `{"_data": [...], "_dataset_size": n}`.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            ResponseBody::Empty => None,
            ResponseBody::Object(map) => Some(Value::Object(map.clone())),
            ResponseBody::Array {
                items,
                dataset_size,
            } => {
                let mut payload = json!({ "_data": items });
                if let Some(size) = dataset_size {
                    payload["_dataset_size"] = json!(size);
                }
                Some(payload)
            }
        }
    }

    /// Reads a body returned by a remote peer.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => match map.remove("_data") {
                Some(Value::Array(items)) => ResponseBody::Array {
                    items,
                    dataset_size: map.get("_dataset_size").and_then(Value::as_u64),
                },
                Some(other) => {
                    map.insert("_data".to_string(), other);
                    ResponseBody::Object(map)
                }
                None => ResponseBody::Object(map),
            },
            Value::Array(items) => ResponseBody::Array {
                items,
                dataset_size: None,
            },
            Value::Null => ResponseBody::Empty,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                ResponseBody::Object(map)
            }
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ResponseBody::Array { .. })
    }
}

/// Response half of a call's context.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub errors: ErrorCollection,
    /// Handler-chosen status; ignored once errors exist.
    pub status: u16,
    pub body: ResponseBody,
    pub headers: BTreeMap<String, String>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            errors: ErrorCollection::new(),
            status: 200,
            body: ResponseBody::Empty,
            headers: BTreeMap::new(),
        }
    }

    /// True once any error has been recorded.
    pub fn halt_processing(&self) -> bool {
        !self.errors.is_empty()
    }

    /// First error's status if any, else the handler-set status.
    pub fn final_status(&self) -> u16 {
        self.errors.first_status().unwrap_or(self.status)
    }

    pub fn set_resource(&mut self, resource: Map<String, Value>) {
        self.body = ResponseBody::Object(resource);
    }

    pub fn set_resources(&mut self, items: Vec<Value>, dataset_size: Option<u64>) {
        self.body = ResponseBody::Array {
            items,
            dataset_size,
        };
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn add_error(&mut self, code: &str, message: impl Into<String>) {
        self.errors.add(code, message);
    }

    /// Records `generic.not_found` for `ident`.
    pub fn not_found(&mut self, ident: &str) {
        self.errors
            .add_with_reference(codes::GENERIC_NOT_FOUND, "Not found", ident);
    }

    /// Wire payload: the error payload once halted, else the body.
    pub fn payload(&self, interaction_id: &str) -> Option<Value> {
        if self.halt_processing() {
            Some(self.errors.to_value(interaction_id))
        } else {
            self.body.to_value()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_defaults_and_errors_override() {
        let mut response = Response::new();
        assert_eq!(response.final_status(), 200);
        assert!(!response.halt_processing());

        response.status = 201;
        assert_eq!(response.final_status(), 201);

        response.not_found("42");
        assert!(response.halt_processing());
        assert_eq!(response.final_status(), 404);
    }

    #[test]
    fn test_array_payload() {
        let mut response = Response::new();
        response.set_resources(vec![json!({"id": 1})], Some(10));

        let payload = response.payload("iid").unwrap();
        assert_eq!(payload["_data"][0]["id"], 1);
        assert_eq!(payload["_dataset_size"], 10);

        response.set_resources(vec![], None);
        let payload = response.payload("iid").unwrap();
        assert!(payload.get("_dataset_size").is_none());
    }

    #[test]
    fn test_error_payload_replaces_body() {
        let mut response = Response::new();
        let mut resource = Map::new();
        resource.insert("id".into(), json!("1"));
        response.set_resource(resource);
        response.add_error(codes::PLATFORM_FAULT, "boom");

        let payload = response.payload("iid").unwrap();
        assert_eq!(payload["kind"], "Errors");
        assert_eq!(payload["errors"][0]["code"], "platform.fault");
    }

    #[test]
    fn test_body_from_value() {
        let array = ResponseBody::from_value(json!({"_data": [1, 2], "_dataset_size": 7}));
        assert_eq!(
            array,
            ResponseBody::Array {
                items: vec![json!(1), json!(2)],
                dataset_size: Some(7)
            }
        );

        let object = ResponseBody::from_value(json!({"id": "x"}));
        assert!(matches!(object, ResponseBody::Object(_)));
        assert_eq!(ResponseBody::from_value(Value::Null), ResponseBody::Empty);
        assert!(ResponseBody::Empty.to_value().is_none());
    }
}
