//! rsdispatch-domain: Core dispatch domain model
//!
//! This crate contains the transport-independent building blocks including:
//! - Tri-state permission engine (allow / deny / ask)
//! - Session model and its canonical map form
//! - Resource descriptors with list, embed and error declarations
//! - Platform error vocabulary and downstream error translation
//! - Request and Response containers for one call
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              rsdispatch-domain               │
//! ├─────────────────────────────────────────────┤
//! │  permissions.rs     - Permission tree       │
//! │  session.rs         - Session model         │
//! │  descriptor.rs      - Resource descriptors  │
//! │  platform_errors.rs - Error vocabulary      │
//! │  request.rs         - Parsed request        │
//! │  response.rs        - Outcome holder        │
//! └─────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod descriptor;
pub mod error;
pub mod permissions;
pub mod platform_errors;
pub mod request;
pub mod response;
pub mod session;

#[cfg(test)]
mod permissions_proptest;

// Re-export commonly used types at the crate root
pub use action::Action;
pub use descriptor::{BodyValidator, ListRules, ResourceDescriptor, ResourceDescriptorBuilder};
pub use error::{DomainError, DomainResult};
pub use permissions::{PermissionRules, Permissions, Verdict};
pub use platform_errors::{ErrorCollection, ErrorEntry};
pub use request::{split_path_remainder, ListParameters, Request};
pub use response::{Response, ResponseBody};
pub use session::Session;
