//! rsdispatch-api: HTTP binding for the dispatcher
//!
//! This crate provides the outer transport layer including:
//! - HTTP routing via Axum, converting requests into inbound calls
//! - Middleware (interaction id, tracing, logging)
//! - reqwest-based transport for remote inter-resource calls
//! - Logging initialisation
//! - Process wiring (dispatcher construction, self-registration)
//! - A small demo resource pair used by the server binary
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsdispatch-api                 │
//! ├─────────────────────────────────────────────┤
//! │  http/          - Router and conversion     │
//! │  middleware/    - Interaction id, tracing   │
//! │  remote.rs      - Remote transport          │
//! │  observability/ - Logging setup             │
//! │  server.rs      - Wiring and serving        │
//! │  demo.rs        - Widget and Gadget         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod demo;
pub mod http;
pub mod middleware;
pub mod observability;
pub mod remote;
pub mod server;
