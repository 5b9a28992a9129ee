//! rsdispatch server binary
//!
//! Serves the demo Widget and Gadget resources through the dispatcher.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! rsdispatch --config config.yaml
//!
//! # With environment variables only
//! RSDISPATCH_SESSION__TEST_SESSION_FALLBACK=true rsdispatch
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use rsdispatch_api::demo::demo_registry;
use rsdispatch_api::observability::{init_logging, LoggingConfig};
use rsdispatch_api::server::{build_dispatcher, serve};
use rsdispatch_server::ServerConfig;

/// rsdispatch - resource dispatch server
#[derive(Parser, Debug)]
#[command(name = "rsdispatch")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::from_env()?,
    };

    init_logging(LoggingConfig::from_settings(&config.logging));
    info!(version = env!("CARGO_PKG_VERSION"), "Starting rsdispatch");

    if config.session.test_session_fallback {
        warn!("test session fallback is enabled; unauthenticated calls get full access");
    }

    let registry = Arc::new(demo_registry()?);
    let dispatcher = build_dispatcher(&config, registry)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let result = serve(dispatcher, listener, shutdown_signal()).await;
    if let Err(ref e) = result {
        error!("HTTP server error: {e:#}");
    }
    result
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parsing() {
        let args = Args::try_parse_from(["rsdispatch"]).unwrap();
        assert!(args.config.is_none());

        let args = Args::try_parse_from(["rsdispatch", "--config", "config.yaml"]).unwrap();
        assert_eq!(args.config.as_deref(), Some("config.yaml"));

        let args = Args::try_parse_from(["rsdispatch", "-c", "test.yaml"]).unwrap();
        assert_eq!(args.config.as_deref(), Some("test.yaml"));
    }
}
