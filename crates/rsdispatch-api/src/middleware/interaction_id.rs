//! Interaction id middleware.
//!
//! Guarantees every request carries `X-Interaction-ID` before the tracing
//! and logging layers run, so the span, the log lines and the dispatcher
//! all report the same correlation id.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use axum::http::{HeaderValue, Request, Response};
use tower::{Layer, Service};

use rsdispatch_server::interaction::{generate_interaction_id, INTERACTION_ID_HEADER};

use super::interaction_id;

/// Layer that stamps an interaction id on requests and responses.
#[derive(Clone, Default)]
pub struct InteractionIdLayer;

impl InteractionIdLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for InteractionIdLayer {
    type Service = InteractionIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InteractionIdService { inner }
    }
}

#[derive(Clone)]
pub struct InteractionIdService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for InteractionIdService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        // Blank ids count as missing
        let id = interaction_id(request.headers()).unwrap_or_else(generate_interaction_id);
        let header = HeaderValue::from_str(&id).ok();

        if let Some(value) = &header {
            request
                .headers_mut()
                .insert(INTERACTION_ID_HEADER, value.clone());
        }

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut response = inner.call(request).await?;
            if let Some(value) = header {
                response
                    .headers_mut()
                    .entry(INTERACTION_ID_HEADER)
                    .or_insert(value);
            }
            Ok(response)
        })
    }
}
