//! Endpoint registry.
//!
//! Built once at start-up, then shared read-only behind an `Arc`. Routes
//! follow `/v{version}/{endpoint}[/{ident}...][.{extension}]`; because
//! endpoints are single `[A-Za-z0-9_-]` segments and `(endpoint, version)`
//! pairs are unique, a path matches at most one endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use rsdispatch_domain::ResourceDescriptor;

use crate::handler::ResourceHandler;

/// Registration errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("resource {name} v{version} is already registered")]
    DuplicateResource { name: String, version: u32 },

    #[error("route /v{version}/{endpoint} is already registered")]
    DuplicateRoute { endpoint: String, version: u32 },
}

/// A descriptor with its handler.
pub struct Endpoint {
    descriptor: Arc<ResourceDescriptor>,
    handler: Arc<dyn ResourceHandler>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    pub fn descriptor(&self) -> &Arc<ResourceDescriptor> {
        &self.descriptor
    }

    pub fn handler(&self) -> &Arc<dyn ResourceHandler> {
        &self.handler
    }
}

/// A matched route.
#[derive(Debug, Clone)]
pub struct RouteMatch<'p> {
    pub endpoint: Arc<Endpoint>,
    /// Everything after `/v{version}/{endpoint}`.
    pub remainder: &'p str,
}

/// Process-local table of endpoints.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    by_route: HashMap<(u32, String), Arc<Endpoint>>,
    by_name: HashMap<(String, u32), Arc<Endpoint>>,
    has_public_actions: bool,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an endpoint, rejecting duplicate resources and routes.
    pub fn register(
        &mut self,
        descriptor: ResourceDescriptor,
        handler: Arc<dyn ResourceHandler>,
    ) -> Result<(), RegistryError> {
        let name_key = (descriptor.name().to_string(), descriptor.version());
        if self.by_name.contains_key(&name_key) {
            return Err(RegistryError::DuplicateResource {
                name: name_key.0,
                version: name_key.1,
            });
        }

        let route_key = (descriptor.version(), descriptor.endpoint().to_string());
        if self.by_route.contains_key(&route_key) {
            return Err(RegistryError::DuplicateRoute {
                endpoint: route_key.1,
                version: route_key.0,
            });
        }

        self.has_public_actions |= !descriptor.public_actions().is_empty();

        let endpoint = Arc::new(Endpoint {
            descriptor: Arc::new(descriptor),
            handler,
        });
        tracing::debug!(
            resource = endpoint.descriptor.name(),
            version = endpoint.descriptor.version(),
            route = %endpoint.descriptor.path_prefix(),
            "registered endpoint"
        );
        self.by_name.insert(name_key, endpoint.clone());
        self.by_route.insert(route_key, endpoint);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(
        mut self,
        descriptor: ResourceDescriptor,
        handler: Arc<dyn ResourceHandler>,
    ) -> Result<Self, RegistryError> {
        self.register(descriptor, handler)?;
        Ok(self)
    }

    /// Matches a request path.
    pub fn match_path<'p>(&self, path: &'p str) -> Option<RouteMatch<'p>> {
        let rest = path.strip_prefix("/v")?;
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let version: u32 = rest[..digits].parse().ok()?;
        let rest = rest[digits..].strip_prefix('/')?;

        let end = rest.find(['/', '.']).unwrap_or(rest.len());
        let (endpoint, remainder) = rest.split_at(end);

        self.by_route
            .get(&(version, endpoint.to_string()))
            .map(|endpoint| RouteMatch {
                endpoint: endpoint.clone(),
                remainder,
            })
    }

    /// Looks up a resource version hosted in this process.
    pub fn find(&self, name: &str, version: u32) -> Option<Arc<Endpoint>> {
        self.by_name.get(&(name.to_string(), version)).cloned()
    }

    /// True if any registered resource declares a public action.
    pub fn has_public_actions(&self) -> bool {
        self.has_public_actions
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
