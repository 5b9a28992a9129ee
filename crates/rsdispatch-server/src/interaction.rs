//! Per-call containers.
//!
//! An [`Interaction`] exists for exactly one inbound call: it owns the raw
//! [`InboundCall`], the correlation id and the [`Context`] handed to the
//! handler. Nested local inter-resource calls get a fresh `Context` that
//! shares the caller's correlation id.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;

use rsdispatch_domain::{Action, Request, Response, Session};

use crate::dispatcher::Dispatcher;
use crate::inter_resource::ResourceEndpoint;
use crate::registry::Endpoint;

/// Correlation id header.
pub const INTERACTION_ID_HEADER: &str = "x-interaction-id";
/// Session id header.
pub const SESSION_ID_HEADER: &str = "x-session-id";
/// Response timing header.
pub const RESPONSE_TIME_HEADER: &str = "x-service-response-time";

/// Generates a correlation id.
pub fn generate_interaction_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Transport-neutral inbound call.
#[derive(Debug, Clone, Default)]
pub struct InboundCall {
    /// Upper-case HTTP method.
    pub method: String,
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Headers with lower-case names.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    /// Set by the transport when the body exceeded the size ceiling and was
    /// not buffered.
    pub body_oversized: bool,
}

impl InboundCall {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Header value, or `None` when absent or blank.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Transport-neutral reply.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl OutboundReply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Everything a handler sees for one call.
pub struct Context {
    pub session: Option<Session>,
    pub request: Request,
    pub response: Response,
    interaction_id: String,
    endpoint: Option<Arc<Endpoint>>,
    action: Option<Action>,
    dispatcher: Arc<Dispatcher>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("interaction_id", &self.interaction_id)
            .field("action", &self.action)
            .field("session", &self.session.as_ref().map(|s| &s.session_id))
            .field("request", &self.request)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        interaction_id: String,
        request: Request,
        session: Option<Session>,
    ) -> Self {
        Self {
            session,
            request,
            response: Response::new(),
            interaction_id,
            endpoint: None,
            action: None,
            dispatcher,
        }
    }

    pub fn interaction_id(&self) -> &str {
        &self.interaction_id
    }

    /// Action being handled, once determined.
    pub fn action(&self) -> Option<Action> {
        self.action
    }

    /// Name of the resource handling this call, once routed.
    pub fn resource_name(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|e| e.descriptor().name())
    }

    pub(crate) fn endpoint(&self) -> Option<&Arc<Endpoint>> {
        self.endpoint.as_ref()
    }

    pub(crate) fn bind(&mut self, endpoint: Arc<Endpoint>) {
        self.response
            .errors
            .declare(endpoint.descriptor().custom_errors());
        self.endpoint = Some(endpoint);
    }

    pub(crate) fn set_action(&mut self, action: Action) {
        self.action = Some(action);
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Endpoint for calling another resource from inside a handler.
    ///
    /// ```ignore
    /// let result = ctx.resource("Widget", 1).show("42", &[]).await?;
    /// ```
    pub fn resource(&self, name: &str, version: u32) -> ResourceEndpoint<'_> {
        ResourceEndpoint::new(self, name, version)
    }
}

/// One inbound call in flight.
#[derive(Debug)]
pub struct Interaction {
    pub interaction_id: String,
    pub call: InboundCall,
    pub context: Context,
}

impl Interaction {
    /// Adopts the inbound correlation id or generates one.
    pub(crate) fn new(dispatcher: Arc<Dispatcher>, call: InboundCall, default_locale: &str) -> Self {
        let interaction_id = call
            .header(INTERACTION_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(generate_interaction_id);
        let context = Context::new(
            dispatcher,
            interaction_id.clone(),
            Request::new(default_locale),
            None,
        );
        Self {
            interaction_id,
            call,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_call_headers_are_case_insensitive() {
        let call = InboundCall::new("get", "/v1/widgets")
            .with_header("X-Session-ID", "abc")
            .with_header("X-Empty", "  ");

        assert_eq!(call.method, "GET");
        assert_eq!(call.header("x-session-id"), Some("abc"));
        assert_eq!(call.header("X-SESSION-ID"), Some("abc"));
        assert_eq!(call.header("x-empty"), None);
        assert_eq!(call.header("x-missing"), None);
    }

    #[test]
    fn test_generated_interaction_ids_are_unique() {
        let a = generate_interaction_id();
        let b = generate_interaction_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_reply_header_lookup() {
        let reply = OutboundReply {
            status: 200,
            headers: vec![("X-Interaction-ID".to_string(), "abc".to_string())],
            body: Bytes::new(),
        };
        assert_eq!(reply.header("x-interaction-id"), Some("abc"));
        assert_eq!(reply.header("x-other"), None);
    }
}
