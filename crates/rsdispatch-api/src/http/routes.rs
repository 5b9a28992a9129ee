//! HTTP route definitions and the request/reply conversion.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::{debug, error, warn};

use rsdispatch_server::dispatcher::MAXIMUM_PAYLOAD_SIZE;
use rsdispatch_server::{InboundCall, OutboundReply};

use super::state::AppState;
use crate::middleware::{InteractionIdLayer, RequestLoggingLayer, TracingLayer};

/// Key probed by the readiness check.
const READINESS_PROBE_KEY: &str = "readiness:probe";

/// Creates the router: operational endpoints plus the dispatcher fallback.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .fallback(dispatch)
        .with_state(Arc::new(state))
}

/// [`create_router`] wrapped in the interaction id, tracing and logging
/// layers.
pub fn create_router_with_observability(state: AppState) -> Router {
    // Last layer runs first
    create_router(state)
        .layer(RequestLoggingLayer::new())
        .layer(TracingLayer::new())
        .layer(InteractionIdLayer::new())
}

async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let call = inbound_call(request).await;
    let reply = state.dispatcher.dispatch(call).await;
    into_response(reply)
}

/// Converts an axum request into a transport-neutral call.
///
/// Bodies over [`MAXIMUM_PAYLOAD_SIZE`] are not buffered; the call is
/// flagged instead so the pipeline can reject it as malformed.
pub async fn inbound_call(request: Request) -> InboundCall {
    let (parts, body) = request.into_parts();

    let mut call = InboundCall::new(parts.method.as_str(), parts.uri.path());
    if let Some(query) = parts.uri.query() {
        call = call.with_query(query);
    }
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => call = call.with_header(name.as_str(), value),
            Err(_) => debug!(header = %name, "ignoring non-ASCII header value"),
        }
    }

    match axum::body::to_bytes(body, MAXIMUM_PAYLOAD_SIZE).await {
        Ok(bytes) => call.with_body(bytes),
        Err(e) => {
            debug!(error = %e, "request body not buffered");
            call.body_oversized = true;
            call
        }
    }
}

/// Converts a dispatcher reply into an axum response.
pub fn into_response(reply: OutboundReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or_else(|_| {
        error!(status = reply.status, "dispatcher produced an invalid status");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut response = Response::new(Body::from(reply.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in reply.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "dropping reply header that is not valid HTTP"),
        }
    }
    response
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe: the session store must answer a read.
///
/// Store errors are logged, not exposed.
async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.dispatcher.sessions().store();
    match store.get(READINESS_PROBE_KEY).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "checks": { "session_store": store.backend_name() }
            })),
        ),
        Err(e) => {
            error!(backend = store.backend_name(), error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "checks": { "session_store": "unavailable" }
                })),
            )
        }
    }
}
