//! HTTP middleware.
//!
//! Includes:
//! - Interaction id propagation
//! - Request tracing spans
//! - Request logging
//!
//! CORS is answered by the dispatcher itself, so there is no CORS layer here.

mod interaction_id;
mod logging;
mod tracing_layer;

pub use interaction_id::{InteractionIdLayer, InteractionIdService};
pub use logging::{RequestLoggingLayer, RequestLoggingService};
pub use tracing_layer::{TracingLayer, TracingService};

use axum::http::HeaderMap;
use rsdispatch_server::interaction::INTERACTION_ID_HEADER;

/// Interaction id carried by `headers`, if any.
pub(crate) fn interaction_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(INTERACTION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests;
