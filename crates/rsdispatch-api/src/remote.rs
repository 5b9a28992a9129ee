//! reqwest-backed transport for remote inter-resource calls.

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::{debug, instrument};

use rsdispatch_domain::Action;
use rsdispatch_server::inter_resource::{
    RemoteReply, RemoteRequest, RemoteTransport, TransportError,
};

/// Calls remote peers over HTTP with JSON bodies.
///
/// No timeout is configured: a peer that never answers holds the calling
/// task, and a refused connection reads as endpoint-not-found upstream.
#[derive(Debug, Clone, Default)]
pub struct HttpRemoteTransport {
    client: Client,
}

impl HttpRemoteTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing client, e.g. one with custom TLS roots.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn method_for(action: Action) -> Method {
    match action {
        Action::List | Action::Show => Method::GET,
        Action::Create => Method::POST,
        Action::Update => Method::PATCH,
        Action::Delete => Method::DELETE,
    }
}

#[async_trait]
impl RemoteTransport for HttpRemoteTransport {
    #[instrument(skip(self, request), fields(location = %request.location, action = %request.action))]
    async fn call(&self, request: RemoteRequest) -> Result<RemoteReply, TransportError> {
        let url = request.url()?;
        let location = request.location.to_string();

        let mut builder = self.client.request(method_for(request.action), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connection {
                location: location.clone(),
                message: e.to_string(),
            })?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection {
                location: location.clone(),
                message: e.to_string(),
            })?;

        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            let value = serde_json::from_slice(&bytes).map_err(|e| {
                TransportError::InvalidReply {
                    location: location.clone(),
                    message: e.to_string(),
                }
            })?;
            Some(value)
        };

        debug!(status, "remote reply received");
        Ok(RemoteReply { status, body })
    }
}
