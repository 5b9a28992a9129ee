//! rsdispatch-server: Dispatch pipeline and business logic
//!
//! This crate contains the business logic layer including:
//! - Configuration management
//! - Endpoint registry and the resource handler trait
//! - Session persistence with caller-version invalidation
//! - The dispatcher pipeline (route, negotiate, authorize, parse, invoke)
//! - Inter-resource calls, local or remote, with derived sessions
//! - Structured reporting
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              rsdispatch-server               │
//! ├─────────────────────────────────────────────┤
//! │  config.rs          - Configuration         │
//! │  registry.rs        - Endpoint table        │
//! │  handler.rs         - Handler trait         │
//! │  session_manager.rs - Session persistence   │
//! │  interaction.rs     - Per-call containers   │
//! │  dispatcher/        - Request pipeline      │
//! │  inter_resource/    - Resource-to-resource  │
//! │  reporting.rs       - Structured log sink   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod inter_resource;
pub mod interaction;
pub mod registry;
pub mod reporting;
pub mod session_manager;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use dispatcher::{DispatchOptions, Dispatcher, DispatcherBuilder, ErrorConfig};
pub use handler::{HandlerResult, ResourceHandler};
pub use inter_resource::{
    discovery_from_settings, register_local_endpoints, Discovery, EndpointResult, HttpDiscovery,
    Location, QueueDiscovery, RemoteReply, RemoteRequest, RemoteTransport, ResourceEndpoint,
    TransportError,
};
pub use interaction::{Context, InboundCall, OutboundReply};
pub use registry::{EndpointRegistry, RegistryError};
pub use reporting::{LogLevel, MemoryReporter, Reporter, TracingReporter};
pub use session_manager::{
    store_from_settings, Augmentation, DeleteOutcome, LoadOutcome, SaveOutcome, SessionError,
    SessionManager,
};
