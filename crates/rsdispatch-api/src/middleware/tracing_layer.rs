//! Request span middleware.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{field::Empty, info_span, Instrument, Span};

use super::interaction_id;

/// Layer that wraps each request in an `interaction` span.
#[derive(Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TracingService<S>
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

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let interaction_id = interaction_id(request.headers()).unwrap_or_default();

        // http.status_code is recorded once the reply is known
        let span = info_span!(
            "interaction",
            method = %request.method(),
            path = %request.uri().path(),
            interaction_id = %interaction_id,
            http.status_code = Empty,
        );

        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                let response = inner.call(request).await?;
                Span::current().record("http.status_code", response.status().as_u16());
                Ok(response)
            }
            .instrument(span),
        )
    }
}
