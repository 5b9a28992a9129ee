//! Locating remote peers.
//!
//! In HTTP mode the discovery table maps `(resource, version)` to the full
//! endpoint URL (`http://host:port/v1/gadgets`) and is seeded from the
//! configured static routes plus self-registration of local endpoints. In
//! queue mode only the static routing table is consulted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};
use url::Url;

use crate::config::{DiscoverySettings, StaticRoute};
use crate::registry::EndpointRegistry;

/// Where a remote resource lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Full endpoint URL.
    Http(Url),
    /// Queue name.
    Queue(String),
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Http(url) => write!(f, "{url}"),
            Location::Queue(queue) => write!(f, "queue:{queue}"),
        }
    }
}

/// Discovery errors.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("invalid location '{location}' for {resource} v{version}: {message}")]
    InvalidLocation {
        resource: String,
        version: u32,
        location: String,
        message: String,
    },

    #[error("unknown discovery mode: {mode}")]
    UnknownMode { mode: String },
}

/// Discovery collaborator.
#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    async fn find(&self, resource: &str, version: u32) -> Option<Location>;

    async fn add(&self, resource: &str, version: u32, location: Location);
}

/// Mutable discovery table for HTTP deployments.
#[derive(Debug, Default)]
pub struct HttpDiscovery {
    table: DashMap<(String, u32), Url>,
}

impl HttpDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the table from static routes.
    pub fn with_routes(routes: &[StaticRoute]) -> Result<Self, DiscoveryError> {
        let discovery = Self::new();
        for route in routes {
            let url = Url::parse(&route.location).map_err(|e| DiscoveryError::InvalidLocation {
                resource: route.resource.clone(),
                version: route.version,
                location: route.location.clone(),
                message: e.to_string(),
            })?;
            discovery
                .table
                .insert((route.resource.clone(), route.version), url);
        }
        Ok(discovery)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[async_trait]
impl Discovery for HttpDiscovery {
    async fn find(&self, resource: &str, version: u32) -> Option<Location> {
        self.table
            .get(&(resource.to_string(), version))
            .map(|url| Location::Http(url.value().clone()))
    }

    async fn add(&self, resource: &str, version: u32, location: Location) {
        match location {
            Location::Http(url) => {
                debug!(resource, version, %url, "discovery entry added");
                self.table.insert((resource.to_string(), version), url);
            }
            Location::Queue(queue) => {
                warn!(resource, version, %queue, "queue location ignored by HTTP discovery");
            }
        }
    }
}

/// Static routing table for queue deployments.
#[derive(Debug, Default)]
pub struct QueueDiscovery {
    table: HashMap<(String, u32), String>,
}

impl QueueDiscovery {
    pub fn with_routes(routes: &[StaticRoute]) -> Self {
        Self {
            table: routes
                .iter()
                .map(|r| ((r.resource.clone(), r.version), r.location.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl Discovery for QueueDiscovery {
    async fn find(&self, resource: &str, version: u32) -> Option<Location> {
        self.table
            .get(&(resource.to_string(), version))
            .map(|queue| Location::Queue(queue.clone()))
    }

    async fn add(&self, resource: &str, version: u32, location: Location) {
        debug!(resource, version, %location, "static routing table ignores additions");
    }
}

/// Builds the configured discovery collaborator.
pub fn discovery_from_settings(
    settings: &DiscoverySettings,
) -> Result<Arc<dyn Discovery>, DiscoveryError> {
    match settings.mode.as_str() {
        "http" => Ok(Arc::new(HttpDiscovery::with_routes(&settings.routes)?)),
        "queue" => Ok(Arc::new(QueueDiscovery::with_routes(&settings.routes))),
        other => Err(DiscoveryError::UnknownMode {
            mode: other.to_string(),
        }),
    }
}

/// Announces every local endpoint at `base_url`. Returns how many were
/// registered.
pub async fn register_local_endpoints(
    discovery: &dyn Discovery,
    registry: &EndpointRegistry,
    base_url: &Url,
) -> Result<usize, DiscoveryError> {
    let mut registered = 0;
    for endpoint in registry.endpoints() {
        let descriptor = endpoint.descriptor();
        let url = base_url
            .join(&descriptor.path_prefix())
            .map_err(|e| DiscoveryError::InvalidLocation {
                resource: descriptor.name().to_string(),
                version: descriptor.version(),
                location: base_url.to_string(),
                message: e.to_string(),
            })?;
        discovery
            .add(descriptor.name(), descriptor.version(), Location::Http(url))
            .await;
        registered += 1;
    }
    Ok(registered)
}
