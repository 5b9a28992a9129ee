//! Middleware tests.

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    routing::get,
    Router,
};
use tower::ServiceExt;

use super::*;

/// Echoes the interaction id the handler saw back in the body.
async fn echo(headers: HeaderMap) -> String {
    interaction_id(&headers).unwrap_or_default()
}

/// Layers are applied bottom-to-top: the last `.layer()` runs first, so
/// the interaction id exists before the span and log lines are created.
fn test_app() -> Router {
    Router::new()
        .route("/", get(echo))
        .route("/error", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .layer(RequestLoggingLayer::new())
        .layer(TracingLayer::new())
        .layer(InteractionIdLayer::new())
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_interaction_id_is_generated() {
    let response = test_app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let header = response
        .headers()
        .get(INTERACTION_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(header.len(), 32);
    assert_eq!(body_text(response).await, header, "handler sees the same id");
}

#[tokio::test]
async fn test_interaction_id_is_propagated() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("X-Interaction-ID", "corr-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[INTERACTION_ID_HEADER], "corr-42");
    assert_eq!(body_text(response).await, "corr-42");
}

#[tokio::test]
async fn test_blank_interaction_id_is_replaced() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("X-Interaction-ID", "   ")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let header = response.headers()[INTERACTION_ID_HEADER]
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(header.len(), 32);
}

#[tokio::test]
async fn test_layers_pass_errors_through() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/error")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key(INTERACTION_ID_HEADER));
}

#[test]
fn test_interaction_id_helper_ignores_blank_values() {
    let mut headers = HeaderMap::new();
    assert_eq!(interaction_id(&headers), None);

    headers.insert(INTERACTION_ID_HEADER, " abc ".parse().unwrap());
    assert_eq!(interaction_id(&headers).as_deref(), Some("abc"));

    headers.insert(INTERACTION_ID_HEADER, "".parse().unwrap());
    assert_eq!(interaction_id(&headers), None);
}
