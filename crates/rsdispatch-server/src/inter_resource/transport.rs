//! Outbound transport seam for remote inter-resource calls.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use rsdispatch_domain::Action;

use super::discovery::Location;

/// Transport failures. An unreadable reply reads as `platform.fault` to the
/// caller; every other failure reads as "endpoint not found".
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection to {location} failed: {message}")]
    Connection { location: String, message: String },

    #[error("no transport for location {location}")]
    UnsupportedLocation { location: String },

    #[error("cannot build request URL from {location}")]
    InvalidUrl { location: String },

    #[error("unreadable reply from {location}: {message}")]
    InvalidReply { location: String, message: String },
}

/// One outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub location: Location,
    pub action: Action,
    pub ident: Option<String>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RemoteRequest {
    pub fn method(&self) -> &'static str {
        self.action.http_method()
    }

    /// Endpoint URL with the identifier segment and query appended.
    pub fn url(&self) -> Result<Url, TransportError> {
        let Location::Http(base) = &self.location else {
            return Err(TransportError::UnsupportedLocation {
                location: self.location.to_string(),
            });
        };

        let mut url = base.clone();
        if let Some(ident) = &self.ident {
            url.path_segments_mut()
                .map_err(|_| TransportError::InvalidUrl {
                    location: base.to_string(),
                })?
                .pop_if_empty()
                .push(ident);
        }
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

/// A remote reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReply {
    pub status: u16,
    /// Decoded JSON body; `None` when empty.
    pub body: Option<Value>,
}

/// Performs remote calls.
#[async_trait]
pub trait RemoteTransport: Send + Sync + 'static {
    async fn call(&self, request: RemoteRequest) -> Result<RemoteReply, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(location: Location, ident: Option<&str>, query: &[(&str, &str)]) -> RemoteRequest {
        RemoteRequest {
            location,
            action: Action::Show,
            ident: ident.map(str::to_string),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[test]
    fn test_url_appends_ident_and_query() {
        let base = Url::parse("http://gadgets:8080/v1/gadgets").unwrap();
        let url = request(Location::Http(base), Some("a b/c"), &[("_embed", "parts")])
            .url()
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://gadgets:8080/v1/gadgets/a%20b%2Fc?_embed=parts"
        );
    }

    #[test]
    fn test_url_for_list_has_no_ident() {
        let base = Url::parse("http://gadgets:8080/v1/gadgets").unwrap();
        let url = request(Location::Http(base), None, &[]).url().unwrap();
        assert_eq!(url.as_str(), "http://gadgets:8080/v1/gadgets");
    }

    #[test]
    fn test_queue_locations_are_unsupported() {
        let err = request(Location::Queue("gadgets".into()), None, &[])
            .url()
            .unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedLocation { .. }));
    }

    #[test]
    fn test_method_follows_action() {
        let base = Url::parse("http://gadgets:8080/v1/gadgets").unwrap();
        let mut req = request(Location::Http(base), None, &[]);
        assert_eq!(req.method(), "GET");
        req.action = Action::Update;
        assert_eq!(req.method(), "PATCH");
    }
}
