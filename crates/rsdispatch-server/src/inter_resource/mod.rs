//! Inter-resource calls.
//!
//! A handler reaches another resource through
//! [`Context::resource`](crate::interaction::Context::resource). The router
//! prefers an endpoint registered in this process and falls back to the
//! discovery collaborator for remote peers.
//!
//! Before either path the caller's session may be swapped for a derived
//! one: if the calling resource declares additional permissions for the
//! action it is handling, a copy with a new id and merged permissions is
//! persisted for the downstream call and deleted again afterwards.
//!
//! Errors coming back are translated into the caller's vocabulary, so a
//! downstream not-found surfaces as `generic.invalid_reference` rather than
//! claiming the outer resource is missing.

pub mod discovery;
pub mod transport;

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use rsdispatch_domain::platform_errors::codes;
use rsdispatch_domain::{Action, ErrorCollection, Request, Response, ResponseBody, Session};

use crate::dispatcher::{interaction_summary, log_level, Dispatcher, Payload};
use crate::interaction::{Context, INTERACTION_ID_HEADER, SESSION_ID_HEADER};
use crate::registry::Endpoint;
use crate::session_manager::{Augmentation, DeleteOutcome, SessionError};

pub use discovery::{
    discovery_from_settings, register_local_endpoints, Discovery, DiscoveryError, HttpDiscovery,
    Location, QueueDiscovery,
};
pub use transport::{RemoteReply, RemoteRequest, RemoteTransport, TransportError};

/// Outcome of an inter-resource call.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResult {
    pub status: u16,
    pub body: ResponseBody,
    /// Already translated into the caller's vocabulary.
    pub errors: ErrorCollection,
}

impl EndpointResult {
    fn failed(errors: ErrorCollection) -> Self {
        let status = errors.first_status().unwrap_or(500);
        Self {
            status,
            body: ResponseBody::Empty,
            errors,
        }
    }

    fn endpoint_not_found(resource: &str, version: u32) -> Self {
        let mut errors = ErrorCollection::new();
        errors.add_with_reference(
            codes::PLATFORM_NOT_FOUND,
            "Inter-resource endpoint not found",
            format!("{resource} v{version} endpoint"),
        );
        Self::failed(errors)
    }

    fn remote_fault(location: &Location, message: &str) -> Self {
        let mut errors = ErrorCollection::new();
        errors.add_with_reference(
            codes::PLATFORM_FAULT,
            format!("Unreadable reply from remote endpoint: {message}"),
            location.to_string(),
        );
        Self::failed(errors)
    }

    fn from_response(response: Response, resource: &str, ident: Option<&str>) -> Self {
        if response.halt_processing() {
            return Self::failed(response.errors.translate_downstream(resource, ident));
        }
        Self {
            status: response.status,
            body: response.body,
            errors: ErrorCollection::new(),
        }
    }

    fn from_reply(reply: RemoteReply, resource: &str, ident: Option<&str>) -> Self {
        if let Some(errors) = reply
            .body
            .as_ref()
            .and_then(|body| ErrorCollection::from_value(body, reply.status))
        {
            if !errors.is_empty() {
                return Self::failed(errors.translate_downstream(resource, ident));
            }
        }

        if reply.status >= 400 {
            let mut errors = ErrorCollection::new();
            errors.add_with_reference(
                codes::PLATFORM_FAULT,
                format!("Unexpected status {} without an error payload", reply.status),
                resource.to_string(),
            );
            return Self::failed(errors);
        }

        Self {
            status: reply.status,
            body: reply.body.map(ResponseBody::from_value).unwrap_or_default(),
            errors: ErrorCollection::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Object body, if any.
    pub fn resource(&self) -> Option<&Map<String, Value>> {
        match &self.body {
            ResponseBody::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Array body, if any.
    pub fn resources(&self) -> Option<&[Value]> {
        match &self.body {
            ResponseBody::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn dataset_size(&self) -> Option<u64> {
        match &self.body {
            ResponseBody::Array { dataset_size, .. } => *dataset_size,
            _ => None,
        }
    }
}

/// A target resource version as seen from inside a handler.
pub struct ResourceEndpoint<'c> {
    caller: &'c Context,
    resource: String,
    version: u32,
}

impl<'c> ResourceEndpoint<'c> {
    pub(crate) fn new(caller: &'c Context, resource: &str, version: u32) -> Self {
        Self {
            caller,
            resource: resource.to_string(),
            version,
        }
    }

    pub async fn list(&self, query: &[(&str, &str)]) -> Result<EndpointResult, SessionError> {
        self.call(Action::List, None, None, query).await
    }

    pub async fn show(
        &self,
        ident: &str,
        query: &[(&str, &str)],
    ) -> Result<EndpointResult, SessionError> {
        self.call(Action::Show, Some(ident), None, query).await
    }

    pub async fn create(
        &self,
        body: Value,
        query: &[(&str, &str)],
    ) -> Result<EndpointResult, SessionError> {
        self.call(Action::Create, None, Some(body), query).await
    }

    pub async fn update(
        &self,
        ident: &str,
        body: Value,
        query: &[(&str, &str)],
    ) -> Result<EndpointResult, SessionError> {
        self.call(Action::Update, Some(ident), Some(body), query).await
    }

    pub async fn delete(
        &self,
        ident: &str,
        query: &[(&str, &str)],
    ) -> Result<EndpointResult, SessionError> {
        self.call(Action::Delete, Some(ident), None, query).await
    }

    async fn call(
        &self,
        action: Action,
        ident: Option<&str>,
        body: Option<Value>,
        query: &[(&str, &str)],
    ) -> Result<EndpointResult, SessionError> {
        let pairs: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        route(
            self.caller,
            &self.resource,
            self.version,
            action,
            ident,
            body,
            pairs,
        )
        .await
    }
}

/// Session chosen for a downstream call.
enum Downstream {
    /// The session to present, and whether it was derived for this call.
    Session(Option<Session>, bool),
    /// The caller's session went stale; the call must not proceed.
    Refused(EndpointResult),
}

async fn downstream_session(
    dispatcher: &Dispatcher,
    caller: &Context,
) -> Result<Downstream, SessionError> {
    let Some(session) = &caller.session else {
        return Ok(Downstream::Session(None, false));
    };

    let extra = caller
        .endpoint()
        .zip(caller.action())
        .and_then(|(endpoint, action)| endpoint.descriptor().additional_permissions_for(action));

    let chosen = match dispatcher
        .sessions()
        .augment_with_permissions_for(session, extra)
        .await?
    {
        Augmentation::Unchanged => Downstream::Session(Some(session.clone()), false),
        Augmentation::Derived(derived) => Downstream::Session(Some(derived), true),
        Augmentation::Outdated => {
            let mut errors = ErrorCollection::new();
            errors.add(codes::PLATFORM_INVALID_SESSION, "Invalid session");
            Downstream::Refused(EndpointResult::failed(errors))
        }
    };
    Ok(chosen)
}

async fn route(
    caller: &Context,
    resource: &str,
    version: u32,
    action: Action,
    ident: Option<&str>,
    body: Option<Value>,
    pairs: Vec<(String, String)>,
) -> Result<EndpointResult, SessionError> {
    let dispatcher = caller.dispatcher().clone();

    let (session, derived) = match downstream_session(&dispatcher, caller).await? {
        Downstream::Session(session, derived) => (session, derived),
        Downstream::Refused(result) => return Ok(result),
    };

    let result = match dispatcher.registry().find(resource, version) {
        Some(endpoint) => {
            Box::pin(call_local(
                &dispatcher,
                caller,
                endpoint,
                session.clone(),
                action,
                ident,
                body,
                &pairs,
            ))
            .await
        }
        None => {
            call_remote(
                &dispatcher,
                caller,
                resource,
                version,
                session.as_ref(),
                action,
                ident,
                body,
                pairs,
            )
            .await
        }
    };

    if derived {
        if let Some(session) = &session {
            if dispatcher.sessions().delete(session).await == DeleteOutcome::Fail {
                debug!(session_id = %session.session_id, "derived session left to expire");
            }
        }
    }

    Ok(result)
}

#[allow(clippy::too_many_arguments)]
async fn call_local(
    dispatcher: &Arc<Dispatcher>,
    caller: &Context,
    endpoint: Arc<Endpoint>,
    session: Option<Session>,
    action: Action,
    ident: Option<&str>,
    body: Option<Value>,
    pairs: &[(String, String)],
) -> EndpointResult {
    let started = Instant::now();
    let mut request = Request::new(caller.request.locale.clone());
    request.path_components = ident.map(|i| vec![i.to_string()]).unwrap_or_default();

    let mut ctx = Context::new(
        dispatcher.clone(),
        caller.interaction_id().to_string(),
        request,
        session,
    );
    ctx.bind(endpoint.clone());

    let outcome = dispatcher
        .process(&endpoint, &mut ctx, action, pairs, Payload::Parsed(body))
        .await;
    if let Err(e) = outcome {
        dispatcher.record_fault(&mut ctx, &format!("{e:#}"));
    }

    let status = ctx.response.final_status();
    dispatcher
        .reporter()
        .report(
            log_level(&ctx, status),
            endpoint.descriptor().name(),
            "inter_resource_local",
            interaction_summary(&ctx, status, started),
        )
        .await;

    EndpointResult::from_response(ctx.response, endpoint.descriptor().name(), ident)
}

#[allow(clippy::too_many_arguments)]
async fn call_remote(
    dispatcher: &Dispatcher,
    caller: &Context,
    resource: &str,
    version: u32,
    session: Option<&Session>,
    action: Action,
    ident: Option<&str>,
    body: Option<Value>,
    pairs: Vec<(String, String)>,
) -> EndpointResult {
    let Some(location) = dispatcher.discovery().find(resource, version).await else {
        return EndpointResult::endpoint_not_found(resource, version);
    };
    let Some(transport) = dispatcher.transport() else {
        warn!(resource, version, %location, "no remote transport configured");
        return EndpointResult::endpoint_not_found(resource, version);
    };

    let mut headers = vec![
        (
            "content-type".to_string(),
            crate::dispatcher::negotiation::CONTENT_TYPE.to_string(),
        ),
        (
            INTERACTION_ID_HEADER.to_string(),
            caller.interaction_id().to_string(),
        ),
        ("content-language".to_string(), caller.request.locale.clone()),
    ];
    if let Some(session) = session {
        headers.push((SESSION_ID_HEADER.to_string(), session.session_id.clone()));
    }

    let request = RemoteRequest {
        location: location.clone(),
        action,
        ident: ident.map(str::to_string),
        query: pairs,
        headers,
        body,
    };

    match transport.call(request).await {
        Ok(reply) => {
            debug!(resource, version, %location, status = reply.status, "remote call finished");
            EndpointResult::from_reply(reply, resource, ident)
        }
        Err(TransportError::InvalidReply { message, .. }) => {
            warn!(resource, version, %location, error = %message, "remote reply unreadable");
            EndpointResult::remote_fault(&location, &message)
        }
        Err(e) => {
            warn!(resource, version, %location, error = %e, "remote call failed");
            EndpointResult::endpoint_not_found(resource, version)
        }
    }
}
