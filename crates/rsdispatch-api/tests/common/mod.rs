//! Shared test utilities for rsdispatch API tests.

// Helpers are used from different test binaries; each one sees only part.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceExt;

use rsdispatch_api::demo::{demo_registry, widget_descriptor, gadget_descriptor, GadgetHandler, WidgetHandler};
use rsdispatch_api::http::{create_router, AppState};
use rsdispatch_api::remote::HttpRemoteTransport;
use rsdispatch_api::server::serve;
use rsdispatch_domain::{Action, Permissions, Session, Verdict};
use rsdispatch_server::{
    Discovery, DispatchOptions, Dispatcher, EndpointRegistry, HttpDiscovery, MemoryReporter,
    SaveOutcome,
};
use rsdispatch_storage::MemorySessionStore;

/// Content type every resource call must carry.
pub const JSON: &str = "application/json; charset=utf-8";

/// How long to wait for a spawned server to announce itself.
pub const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5);

/// A dispatcher over the demo resources with inspectable collaborators.
pub struct TestApp {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<MemorySessionStore>,
    pub reporter: Arc<MemoryReporter>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(DispatchOptions::default())
    }

    pub fn with_options(options: DispatchOptions) -> Self {
        let store = MemorySessionStore::new_shared();
        let reporter = Arc::new(MemoryReporter::new());
        let dispatcher = Dispatcher::builder(Arc::new(demo_registry().unwrap()), store.clone())
            .reporter(reporter.clone())
            .options(options)
            .build();
        Self {
            dispatcher,
            store,
            reporter,
        }
    }

    /// A fresh router; `oneshot` consumes it.
    pub fn router(&self) -> axum::Router {
        create_router(AppState::new(self.dispatcher.clone()))
    }

    pub async fn session(&self, permissions: Permissions) -> Session {
        save_session(&self.dispatcher, permissions).await
    }

    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        session: Option<&Session>,
        body: Option<Value>,
    ) -> Reply {
        call(self.router(), method, uri, session, body).await
    }
}

/// Persists a session for `caller-1` with the given permissions.
pub async fn save_session(dispatcher: &Dispatcher, permissions: Permissions) -> Session {
    let mut session = Session::for_caller("caller-1", 1).with_permissions(permissions);
    assert_eq!(dispatcher.sessions().save(&mut session).await, SaveOutcome::Ok);
    session
}

/// Permissions allowing exactly the listed grants.
pub fn grants(allowed: &[(&str, Action)]) -> Permissions {
    let mut permissions = Permissions::new();
    for (resource, action) in allowed {
        permissions.set_resource(*resource, *action, Verdict::Allow);
    }
    permissions
}

/// A decoded reply.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    pub fn error_codes(&self) -> Vec<String> {
        self.body["errors"]
            .as_array()
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e["code"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Sends one request through `app`.
pub async fn call(
    app: axum::Router,
    method: &str,
    uri: &str,
    session: Option<&Session>,
    body: Option<Value>,
) -> Reply {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", JSON);
    if let Some(session) = session {
        builder = builder.header("x-session-id", session.session_id.as_str());
    }
    let body = body
        .map(|b| Body::from(serde_json::to_vec(&b).unwrap()))
        .unwrap_or_else(Body::empty);

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        headers,
        body,
    }
}

/// Registry with only the Widget resource.
pub fn widget_registry() -> EndpointRegistry {
    EndpointRegistry::new()
        .with(widget_descriptor().unwrap(), Arc::new(WidgetHandler::new()))
        .unwrap()
}

/// Registry with only the Gadget resource.
pub fn gadget_registry() -> EndpointRegistry {
    EndpointRegistry::new()
        .with(gadget_descriptor().unwrap(), Arc::new(GadgetHandler::new()))
        .unwrap()
}

/// A dispatcher wired for real remote calls.
pub fn networked_dispatcher(
    registry: EndpointRegistry,
    store: Arc<MemorySessionStore>,
    discovery: Arc<HttpDiscovery>,
) -> Arc<Dispatcher> {
    Dispatcher::builder(Arc::new(registry), store)
        .discovery(discovery)
        .transport(Arc::new(HttpRemoteTransport::new()))
        .build()
}

/// A server running on an ephemeral port.
pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Serves `dispatcher` on 127.0.0.1 and waits until `resource` v1 is in
/// `discovery`.
pub async fn spawn_server(
    dispatcher: Arc<Dispatcher>,
    discovery: &HttpDiscovery,
    resource: &str,
) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let _ = serve(dispatcher, listener, async {
            let _ = rx.await;
        })
        .await;
    });

    tokio::time::timeout(REGISTRATION_TIMEOUT, async {
        while discovery.find(resource, 1).await.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("server did not register in time");

    RunningServer {
        addr,
        shutdown: Some(tx),
    }
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
