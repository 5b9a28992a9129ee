//! End-to-end dispatch tests through the HTTP binding.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use rsdispatch_domain::{Action, Permissions, Verdict};
use rsdispatch_server::{DispatchOptions, LogLevel};

use common::{grants, TestApp};

async fn seed_widgets(app: &TestApp, names: &[&str]) {
    let admin = app.session(Permissions::allow_all()).await;
    for name in names {
        let reply = app
            .call("POST", "/v1/widgets", Some(&admin), Some(json!({ "name": name })))
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{:?}", reply.body);
        // keeps created_at strictly increasing
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
}

// ============================================================
// Listing
// ============================================================

#[tokio::test]
async fn test_list_honours_limit_and_sort() {
    let app = TestApp::new();
    seed_widgets(&app, &["gear", "axle", "nut", "bolt", "cog", "washer", "spring"]).await;
    let session = app.session(grants(&[("Widget", Action::List)])).await;

    let reply = app
        .call(
            "GET",
            "/v1/widgets?limit=5&sort=name&direction=asc",
            Some(&session),
            None,
        )
        .await;

    assert_eq!(reply.status, StatusCode::OK);
    let names: Vec<&str> = reply.body["_data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["axle", "bolt", "cog", "gear", "nut"]);
    assert_eq!(reply.body["_dataset_size"], 7);
}

#[tokio::test]
async fn test_default_sort_is_newest_first() {
    let app = TestApp::new();
    seed_widgets(&app, &["first", "second", "third"]).await;
    let session = app.session(grants(&[("Widget", Action::List)])).await;

    let reply = app.call("GET", "/v1/widgets", Some(&session), None).await;

    assert_eq!(reply.body["_data"][0]["name"], "third");
    assert_eq!(reply.body["_data"][2]["name"], "first");
}

#[tokio::test]
async fn test_bogus_sort_is_one_malformed_error() {
    let app = TestApp::new();
    let session = app.session(grants(&[("Widget", Action::List)])).await;

    let reply = app
        .call("GET", "/v1/widgets?sort=bogus_field", Some(&session), None)
        .await;

    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.error_codes(), vec!["platform.malformed"]);
    assert_eq!(reply.body["errors"][0]["reference"], "sort");
}

#[tokio::test]
async fn test_filter_on_undeclared_key_is_malformed() {
    let app = TestApp::new();
    let session = app.session(grants(&[("Widget", Action::List)])).await;

    let reply = app
        .call("GET", "/v1/widgets?filter=size%3D3", Some(&session), None)
        .await;

    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.body["errors"][0]["reference"], "filter");
}

// ============================================================
// Authorization
// ============================================================

#[tokio::test]
async fn test_denied_create_leaves_no_trace() {
    let app = TestApp::new();
    let mut permissions = Permissions::new();
    permissions
        .set_resource("Widget", Action::Create, Verdict::Deny)
        .set_resource("Widget", Action::List, Verdict::Allow);
    let session = app.session(permissions).await;

    let reply = app
        .call(
            "POST",
            "/v1/widgets",
            Some(&session),
            Some(json!({ "name": "sneaky" })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.error_codes(), vec!["platform.forbidden"]);

    let reply = app.call("GET", "/v1/widgets", Some(&session), None).await;
    assert_eq!(reply.body["_dataset_size"], 0);
}

#[tokio::test]
async fn test_default_fallback_applies_to_unlisted_resources() {
    let app = TestApp::new();
    let mut permissions = Permissions::new();
    permissions.set_default_fallback(Verdict::Allow);
    let session = app.session(permissions).await;

    let reply = app.call("GET", "/v1/gadgets", Some(&session), None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_or_unknown_session_is_invalid() {
    let app = TestApp::new();

    let reply = app.call("GET", "/v1/widgets", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let mut ghost = rsdispatch_domain::Session::for_caller("caller-1", 1);
    ghost.session_id = "not-stored".to_string();
    let reply = app.call("GET", "/v1/widgets", Some(&ghost), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.error_codes(), vec!["platform.invalid_session"]);
}

#[tokio::test]
async fn test_caller_version_bump_invalidates_sessions() {
    let app = TestApp::new();
    let session = app.session(Permissions::allow_all()).await;

    let reply = app.call("GET", "/v1/widgets", Some(&session), None).await;
    assert_eq!(reply.status, StatusCode::OK);

    app.dispatcher
        .sessions()
        .update_caller_version("caller-1", 2)
        .await;

    let reply = app.call("GET", "/v1/widgets", Some(&session), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_test_session_fallback() {
    let app = TestApp::with_options(DispatchOptions {
        test_session_fallback: true,
        ..DispatchOptions::default()
    });

    let reply = app.call("GET", "/v1/widgets", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

// ============================================================
// Actions and validation
// ============================================================

#[tokio::test]
async fn test_unsupported_action_is_method_not_allowed() {
    let app = TestApp::new();
    let session = app.session(Permissions::allow_all()).await;

    let reply = app
        .call("PATCH", "/v1/gadgets/1", Some(&session), Some(json!({ "name": "x" })))
        .await;

    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(reply.error_codes(), vec!["platform.method_not_allowed"]);
}

#[tokio::test]
async fn test_validator_errors_are_reported() {
    let app = TestApp::new();
    let session = app.session(Permissions::allow_all()).await;

    let reply = app
        .call("POST", "/v1/widgets", Some(&session), Some(json!({ "name": 7 })))
        .await;

    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.error_codes(), vec!["generic.invalid_parameters"]);
    assert_eq!(reply.body["errors"][0]["reference"], "name");
}

#[tokio::test]
async fn test_custom_error_uses_declared_status() {
    let app = TestApp::new();
    seed_widgets(&app, &["unique"]).await;
    let session = app.session(Permissions::allow_all()).await;

    let reply = app
        .call("POST", "/v1/widgets", Some(&session), Some(json!({ "name": "unique" })))
        .await;

    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.error_codes(), vec!["widget.duplicate_name"]);
}

#[tokio::test]
async fn test_update_and_delete_round() {
    let app = TestApp::new();
    seed_widgets(&app, &["old"]).await;
    let session = app.session(Permissions::allow_all()).await;

    let reply = app
        .call("PATCH", "/v1/widgets/1", Some(&session), Some(json!({ "name": "new", "id": "99" })))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["name"], "new");
    assert_eq!(reply.body["id"], "1");

    let reply = app.call("DELETE", "/v1/widgets/1", Some(&session), None).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app.call("GET", "/v1/widgets/1", Some(&session), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.error_codes(), vec!["generic.not_found"]);
}

// ============================================================
// Correlation and logging
// ============================================================

#[tokio::test]
async fn test_every_reply_carries_interaction_id() {
    let app = TestApp::new();

    let reply = app.call("GET", "/v1/unknown", None, None).await;

    let id = reply.headers["x-interaction-id"].to_str().unwrap();
    assert_eq!(reply.body["interaction_id"], id);
}

#[tokio::test]
async fn test_one_log_entry_per_interaction() {
    let app = TestApp::new();
    let session = app.session(grants(&[("Widget", Action::List)])).await;
    app.reporter.clear().await;

    app.call("GET", "/v1/widgets?limit=2", Some(&session), None).await;
    app.call("POST", "/v1/widgets", Some(&session), Some(json!({ "name": "x" })))
        .await;

    let entries = app.reporter.entries_with_code("interaction").await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].level, LogLevel::Info);
    assert_eq!(entries[0].payload["request"]["limit"], 2);
    assert_eq!(entries[1].level, LogLevel::Warn);
    assert_eq!(entries[1].payload["status"], 403);
}
