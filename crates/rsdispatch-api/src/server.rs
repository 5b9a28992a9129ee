//! Process wiring: dispatcher construction, self-registration and serving.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use url::Url;

use rsdispatch_server::{
    discovery_from_settings, register_local_endpoints, store_from_settings, DispatchOptions,
    Dispatcher, EndpointRegistry, ServerConfig,
};

use crate::http::{create_router_with_observability, AppState};
use crate::remote::HttpRemoteTransport;

/// Builds the dispatcher described by `config` around `registry`.
pub fn build_dispatcher(
    config: &ServerConfig,
    registry: Arc<EndpointRegistry>,
) -> anyhow::Result<Arc<Dispatcher>> {
    let store = store_from_settings(&config.session);
    let discovery = discovery_from_settings(&config.discovery)?;

    info!(
        session_backend = store.backend_name(),
        discovery = %config.discovery.mode,
        endpoints = registry.len(),
        "dispatcher configured"
    );

    Ok(Dispatcher::builder(registry, store)
        .discovery(discovery)
        .transport(Arc::new(HttpRemoteTransport::new()))
        .options(DispatchOptions::from_config(config))
        .build())
}

/// URL peers use to reach a listener bound to `addr`. Wildcard binds
/// advertise the loopback address.
pub fn advertised_url(addr: SocketAddr) -> Result<Url, url::ParseError> {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    Url::parse(&format!("http://{}/", SocketAddr::new(ip, addr.port())))
}

/// Announces local endpoints at the listener's address, then serves until
/// `shutdown` resolves.
pub async fn serve<F>(
    dispatcher: Arc<Dispatcher>,
    listener: TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let base_url = advertised_url(addr)?;
    let registered = register_local_endpoints(
        dispatcher.discovery().as_ref(),
        dispatcher.registry(),
        &base_url,
    )
    .await?;
    info!(%addr, %base_url, registered, "HTTP server listening");

    let router = create_router_with_observability(AppState::new(dispatcher));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}
