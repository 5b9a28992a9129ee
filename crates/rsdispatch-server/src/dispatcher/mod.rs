//! The dispatch pipeline.
//!
//! Every inbound call runs through these stages in order. Each stage stops
//! the pipeline as soon as the response holds an error; shaping and logging
//! always run.
//!
//! 1. route match
//! 2. content negotiation
//! 3. locale resolution
//! 4. CORS (preflights end here)
//! 5. session load
//! 6. action mapping and authorization
//! 7. structural and body validation
//! 8. query string parsing
//! 9. deferred (`ask`) authorization through the handler's `verify`
//! 10. handler invocation with `before` and `after` hooks
//! 11. response shaping and one structured log entry
//!
//! Local inter-resource calls enter at stage 6 through
//! [`Dispatcher::process`].

pub mod negotiation;
pub mod query;


use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, error};

use rsdispatch_domain::platform_errors::codes;
use rsdispatch_domain::{split_path_remainder, Action, Session, Verdict};
use rsdispatch_storage::SessionStore;

use crate::config::ServerConfig;
use crate::handler::{invoke, HandlerResult};
use crate::inter_resource::{Discovery, HttpDiscovery, RemoteTransport};
use crate::interaction::{
    Context, InboundCall, Interaction, OutboundReply, INTERACTION_ID_HEADER,
    RESPONSE_TIME_HEADER, SESSION_ID_HEADER,
};
use crate::registry::{Endpoint, EndpointRegistry};
use crate::reporting::{summarise, LogLevel, Reporter, TracingReporter};
use crate::session_manager::{LoadOutcome, SessionManager};

use self::negotiation::{Cors, CONTENT_TYPE};
use self::query::{parse_query, query_pairs};

/// Largest accepted request body.
pub const MAXIMUM_PAYLOAD_SIZE: usize = 1_048_576;

/// Reply used when shaping a fault reply fails too.
const BARE_FAULT_BODY: &[u8] =
    br#"{"errors":[{"code":"platform.fault","message":"Internal error"}],"kind":"Errors"}"#;

/// How much detail faults expose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorConfig {
    /// Put exception text into the fault reference.
    pub detailed_errors: bool,
}

/// Dispatcher behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    pub default_locale: String,
    pub test_session_fallback: bool,
    pub errors: ErrorConfig,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            default_locale: "en-nz".to_string(),
            test_session_fallback: false,
            errors: ErrorConfig::default(),
        }
    }
}

impl DispatchOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            default_locale: config.dispatch.default_locale.clone(),
            test_session_fallback: config.session.test_session_fallback,
            errors: ErrorConfig {
                detailed_errors: config.dispatch.detailed_errors,
            },
        }
    }
}

/// Body handed to stage 7.
pub(crate) enum Payload<'a> {
    /// Raw bytes from the transport.
    Raw { bytes: &'a Bytes, oversized: bool },
    /// Already-decoded body from a local inter-resource call.
    Parsed(Option<Value>),
}

/// How the pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Complete,
    Preflight,
}

/// The application object: registry, collaborators and options, built once
/// and shared by every request.
pub struct Dispatcher {
    registry: Arc<EndpointRegistry>,
    sessions: SessionManager,
    discovery: Arc<dyn Discovery>,
    transport: Option<Arc<dyn RemoteTransport>>,
    reporter: Arc<dyn Reporter>,
    options: DispatchOptions,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoints", &self.registry.len())
            .field("remote", &self.transport.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    registry: Arc<EndpointRegistry>,
    store: Arc<dyn SessionStore>,
    discovery: Option<Arc<dyn Discovery>>,
    transport: Option<Arc<dyn RemoteTransport>>,
    reporter: Option<Arc<dyn Reporter>>,
    options: DispatchOptions,
}

impl DispatcherBuilder {
    pub fn discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Arc<Dispatcher> {
        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(TracingReporter) as Arc<dyn Reporter>);
        Arc::new(Dispatcher {
            registry: self.registry,
            sessions: SessionManager::new(self.store, reporter.clone()),
            discovery: self
                .discovery
                .unwrap_or_else(|| Arc::new(HttpDiscovery::new()) as Arc<dyn Discovery>),
            transport: self.transport,
            reporter,
            options: self.options,
        })
    }
}

impl Dispatcher {
    pub fn builder(
        registry: Arc<EndpointRegistry>,
        store: Arc<dyn SessionStore>,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            registry,
            store,
            discovery: None,
            transport: None,
            reporter: None,
            options: DispatchOptions::default(),
        }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn discovery(&self) -> &Arc<dyn Discovery> {
        &self.discovery
    }

    pub fn transport(&self) -> Option<&Arc<dyn RemoteTransport>> {
        self.transport.as_ref()
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Runs one inbound call to completion. Never panics and never fails:
    /// every problem ends up in the reply.
    pub async fn dispatch(self: &Arc<Self>, call: InboundCall) -> OutboundReply {
        let started = Instant::now();
        let mut interaction = Interaction::new(self.clone(), call, &self.options.default_locale);
        let mut cors_headers = Vec::new();

        let outcome = AssertUnwindSafe(self.run(&mut interaction, &mut cors_headers))
            .catch_unwind()
            .await;

        let flow = match outcome {
            Ok(Ok(flow)) => flow,
            Ok(Err(e)) => {
                self.record_fault(&mut interaction.context, &format!("{e:#}"));
                Flow::Complete
            }
            Err(panic) => {
                self.record_fault(&mut interaction.context, &panic_message(panic.as_ref()));
                Flow::Complete
            }
        };

        let shaped = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.shape(&interaction, flow, cors_headers, started)
        }));
        let reply = match shaped {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                error!(target: "rsdispatch::dispatch", interaction_id = %interaction.interaction_id, error = %e, "could not shape reply");
                bare_fault_reply(&interaction.interaction_id)
            }
            Err(_) => {
                error!(target: "rsdispatch::dispatch", interaction_id = %interaction.interaction_id, "panic while shaping reply");
                bare_fault_reply(&interaction.interaction_id)
            }
        };

        let logged = AssertUnwindSafe(self.log_interaction(&interaction, reply.status, started))
            .catch_unwind()
            .await;
        if logged.is_err() {
            error!(target: "rsdispatch::dispatch", interaction_id = %interaction.interaction_id, "reporter panicked");
        }

        reply
    }

    /// Stages 1 to 10 for an inbound call.
    async fn run(
        self: &Arc<Self>,
        interaction: &mut Interaction,
        cors_headers: &mut Vec<(String, String)>,
    ) -> anyhow::Result<Flow> {
        let Interaction { call, context, .. } = interaction;

        let Some(route) = self.registry.match_path(&call.path) else {
            context.response.errors.add_with_reference(
                codes::PLATFORM_NOT_FOUND,
                "Not found",
                call.path.clone(),
            );
            return Ok(Flow::Complete);
        };
        let endpoint = route.endpoint.clone();
        let (components, extension) = split_path_remainder(route.remainder);
        context.request.path_components = components;
        context.request.extension = extension;
        context.request.headers = call.headers.clone();
        context.bind(endpoint.clone());

        let preflight = call.method == "OPTIONS" && call.header("origin").is_some();
        if !preflight && !negotiation::acceptable_content_type(call.header("content-type")) {
            context.response.errors.add_with_reference(
                codes::PLATFORM_MALFORMED,
                format!("Content-Type '{}' is not supported; use '{CONTENT_TYPE}'", call.header("content-type").unwrap_or_default()),
                "content-type",
            );
            return Ok(Flow::Complete);
        }

        context.request.locale = negotiation::resolve_locale(call, &self.options.default_locale);

        match negotiation::cors(call) {
            Cors::NotRequested => {}
            Cors::Simple(headers) => cors_headers.extend(headers),
            Cors::Preflight(headers) => {
                *cors_headers = headers;
                return Ok(Flow::Preflight);
            }
            Cors::PreflightRejected => {
                context.response.errors.add_with_reference(
                    codes::PLATFORM_METHOD_NOT_ALLOWED,
                    "Preflight asked for a method or header that is not allowed",
                    "OPTIONS",
                );
                return Ok(Flow::Complete);
            }
        }

        context.session = self.load_session(call).await;
        if context.session.is_none() && !self.registry.has_public_actions() {
            context
                .response
                .errors
                .add(codes::PLATFORM_INVALID_SESSION, "Invalid session");
            return Ok(Flow::Complete);
        }

        let Some(action) = Action::from_http(&call.method, context.request.ident().is_some())
        else {
            context.response.errors.add_with_reference(
                codes::PLATFORM_METHOD_NOT_ALLOWED,
                format!("Method '{}' is not allowed", call.method),
                call.method.clone(),
            );
            return Ok(Flow::Complete);
        };

        let pairs = query_pairs(call.query.as_deref());
        let payload = Payload::Raw {
            bytes: &call.body,
            oversized: call.body_oversized,
        };
        self.process(&endpoint, context, action, &pairs, payload)
            .await?;

        Ok(Flow::Complete)
    }

    /// Stages 6 to 10: authorize, validate, parse, verify and invoke.
    pub(crate) async fn process(
        &self,
        endpoint: &Arc<Endpoint>,
        ctx: &mut Context,
        action: Action,
        pairs: &[(String, String)],
        payload: Payload<'_>,
    ) -> HandlerResult {
        let descriptor = endpoint.descriptor().clone();
        ctx.set_action(action);

        if !descriptor.supports(action) {
            ctx.response.errors.add_with_reference(
                codes::PLATFORM_METHOD_NOT_ALLOWED,
                format!(
                    "{} v{} does not support '{action}'",
                    descriptor.name(),
                    descriptor.version()
                ),
                action.http_method(),
            );
            return Ok(());
        }

        let verdict = if descriptor.is_public(action) {
            Verdict::Allow
        } else {
            match &ctx.session {
                Some(session) => session.permissions.permitted(descriptor.name(), action),
                None => {
                    ctx.response
                        .errors
                        .add(codes::PLATFORM_INVALID_SESSION, "Invalid session");
                    return Ok(());
                }
            }
        };
        if verdict == Verdict::Deny {
            add_forbidden(ctx, descriptor.name(), action);
            return Ok(());
        }

        self.validate_structure(&descriptor, ctx, action, payload);
        if ctx.response.halt_processing() {
            return Ok(());
        }

        match parse_query(pairs, &descriptor, action) {
            Ok(parsed) => {
                ctx.request.list = parsed.list;
                ctx.request.embeds = parsed.embeds;
                ctx.request.references = parsed.references;
            }
            Err(offending) => {
                ctx.response.errors.add_with_reference(
                    codes::PLATFORM_MALFORMED,
                    "One or more malformed or invalid query string parameters",
                    offending.join(", "),
                );
                return Ok(());
            }
        }

        let handler = endpoint.handler().clone();

        if verdict == Verdict::Ask {
            let decision = handler.verify(ctx, action).await?;
            debug!(target: "rsdispatch::dispatch", resource = descriptor.name(), %action, ?decision, "deferred authorization");
            if decision != Verdict::Allow {
                add_forbidden(ctx, descriptor.name(), action);
                return Ok(());
            }
        }

        let before = handler.before(ctx).await;
        let outcome = match before {
            Ok(()) if !ctx.response.halt_processing() => {
                invoke(handler.as_ref(), action, ctx).await
            }
            other => other,
        };
        let after = handler.after(ctx).await;
        outcome.and(after)
    }

    /// Stage 7: path components and body.
    fn validate_structure(
        &self,
        descriptor: &rsdispatch_domain::ResourceDescriptor,
        ctx: &mut Context,
        action: Action,
        payload: Payload<'_>,
    ) {
        let errors = &mut ctx.response.errors;
        let components = &ctx.request.path_components;

        if action.requires_ident() && components.is_empty() {
            errors.add_with_reference(
                codes::PLATFORM_MALFORMED,
                format!("Action '{action}' needs an identifier in the path"),
                "path",
            );
        } else if !action.requires_ident() && !components.is_empty() {
            errors.add_with_reference(
                codes::PLATFORM_MALFORMED,
                format!("Action '{action}' takes no path components"),
                components.join("/"),
            );
        }

        let body = match payload {
            Payload::Raw { bytes, oversized } => {
                if oversized || bytes.len() > MAXIMUM_PAYLOAD_SIZE {
                    errors.add_with_reference(
                        codes::PLATFORM_MALFORMED,
                        format!("Body exceeds {MAXIMUM_PAYLOAD_SIZE} bytes"),
                        "body",
                    );
                    return;
                }
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    None
                } else {
                    match serde_json::from_slice::<Value>(bytes) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            errors.add_with_reference(
                                codes::PLATFORM_MALFORMED,
                                format!("Body is not valid JSON: {e}"),
                                "body",
                            );
                            return;
                        }
                    }
                }
            }
            Payload::Parsed(value) => value,
        };

        match (action.takes_body(), body) {
            (true, Some(body @ Value::Object(_))) => {
                if let Some(validator) = descriptor.validator() {
                    for entry in validator.validate(action, &body) {
                        errors.push(entry);
                    }
                }
                ctx.request.body = Some(body);
            }
            (true, Some(_)) => {
                errors.add_with_reference(
                    codes::PLATFORM_MALFORMED,
                    "Body must be a JSON object",
                    "body",
                );
            }
            (true, None) => {
                errors.add_with_reference(
                    codes::PLATFORM_MALFORMED,
                    format!("Action '{action}' needs a body"),
                    "body",
                );
            }
            (false, Some(_)) => {
                errors.add_with_reference(
                    codes::PLATFORM_MALFORMED,
                    format!("Action '{action}' takes no body"),
                    "body",
                );
            }
            (false, None) => {}
        }
    }

    /// Stage 5 lookup with the optional test-session fallback.
    async fn load_session(&self, call: &InboundCall) -> Option<Session> {
        let loaded = match call.header(SESSION_ID_HEADER) {
            Some(session_id) => match self.sessions.load(session_id).await {
                LoadOutcome::Ok(session) => Some(session),
                LoadOutcome::Outdated => {
                    debug!(target: "rsdispatch::dispatch", session_id, "session outdated");
                    None
                }
                LoadOutcome::NotFound => {
                    debug!(target: "rsdispatch::dispatch", session_id, "session not found");
                    None
                }
                LoadOutcome::Fail => None,
            },
            None => None,
        };
        loaded.or_else(|| {
            self.options
                .test_session_fallback
                .then(Session::test_session)
        })
    }

    /// Replaces whatever the response holds with one `platform.fault`.
    pub(crate) fn record_fault(&self, ctx: &mut Context, detail: &str) {
        error!(
            target: "rsdispatch::dispatch",
            interaction_id = ctx.interaction_id(),
            resource = ctx.resource_name().unwrap_or("-"),
            detail,
            "handler fault"
        );
        ctx.response.errors.clear();
        if self.options.errors.detailed_errors {
            ctx.response
                .errors
                .add_with_reference(codes::PLATFORM_FAULT, "Internal error", detail);
        } else {
            ctx.response.errors.add(codes::PLATFORM_FAULT, "Internal error");
        }
    }

    /// Stage 11 shaping.
    fn shape(
        &self,
        interaction: &Interaction,
        flow: Flow,
        cors_headers: Vec<(String, String)>,
        started: Instant,
    ) -> Result<OutboundReply, serde_json::Error> {
        let mut headers = cors_headers;
        headers.push((
            INTERACTION_ID_HEADER.to_string(),
            interaction.interaction_id.clone(),
        ));
        headers.push((
            RESPONSE_TIME_HEADER.to_string(),
            format!("{}ms", started.elapsed().as_millis()),
        ));

        if flow == Flow::Preflight {
            return Ok(OutboundReply {
                status: 200,
                headers,
                body: Bytes::new(),
            });
        }

        let response = &interaction.context.response;
        headers.push(("content-type".to_string(), CONTENT_TYPE.to_string()));
        headers.extend(
            response
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );

        let body = match response.payload(&interaction.interaction_id) {
            Some(payload) => Bytes::from(serde_json::to_vec(&payload)?),
            None => Bytes::new(),
        };

        Ok(OutboundReply {
            status: response.final_status(),
            headers,
            body,
        })
    }

    /// Stage 11 logging: one entry per interaction.
    async fn log_interaction(&self, interaction: &Interaction, status: u16, started: Instant) {
        let ctx = &interaction.context;
        let payload = interaction_summary(ctx, status, started);
        let payload = match payload {
            Value::Object(mut map) => {
                map.insert("method".to_string(), json!(interaction.call.method));
                map.insert("path".to_string(), json!(interaction.call.path));
                Value::Object(map)
            }
            other => other,
        };
        let level = log_level(ctx, status);
        let component = ctx.resource_name().unwrap_or("Dispatcher").to_string();
        self.reporter
            .report(level, &component, "interaction", payload)
            .await;
    }
}

/// Log entry body shared by inbound and local inter-resource calls.
pub(crate) fn interaction_summary(ctx: &Context, status: u16, started: Instant) -> Value {
    let endpoint = ctx.endpoint().map(|e| e.descriptor().clone());
    let action = ctx.action();

    let request = match action {
        Some(Action::List) => ctx.request.list.to_value(),
        _ => ctx.request.body.as_ref().map(summarise).unwrap_or(Value::Null),
    };
    let response = if ctx.response.halt_processing() {
        summarise(&ctx.response.errors.to_value(ctx.interaction_id()))
    } else if action == Some(Action::List) {
        Value::Null
    } else {
        ctx.response
            .body
            .to_value()
            .as_ref()
            .map(summarise)
            .unwrap_or(Value::Null)
    };

    json!({
        "interaction_id": ctx.interaction_id(),
        "resource": endpoint.as_ref().map(|d| d.name().to_string()),
        "version": endpoint.as_ref().map(|d| d.version()),
        "action": action.map(|a| a.as_str()),
        "status": status,
        "duration_ms": started.elapsed().as_millis() as u64,
        "locale": ctx.request.locale,
        "session_id": ctx.session.as_ref().map(|s| s.session_id.clone()),
        "caller_id": ctx.session.as_ref().and_then(|s| s.caller_id.clone()),
        "request": request,
        "response": response,
    })
}

pub(crate) fn log_level(ctx: &Context, status: u16) -> LogLevel {
    if status >= 500 {
        LogLevel::Error
    } else if ctx.response.halt_processing() {
        LogLevel::Warn
    } else {
        LogLevel::Info
    }
}

fn add_forbidden(ctx: &mut Context, resource: &str, action: Action) {
    ctx.response.errors.add_with_reference(
        codes::PLATFORM_FORBIDDEN,
        format!("Action '{action}' on {resource} is prohibited"),
        format!("{resource}:{action}"),
    );
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

fn bare_fault_reply(interaction_id: &str) -> OutboundReply {
    OutboundReply {
        status: 500,
        headers: vec![
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            (INTERACTION_ID_HEADER.to_string(), interaction_id.to_string()),
        ],
        body: Bytes::from_static(BARE_FAULT_BODY),
    }
}
