//! rsdispatch-storage: Session store abstraction layer
//!
//! This crate provides the key/value persistence used by sessions, including:
//! - SessionStore trait for get/set/delete with TTL
//! - In-memory implementation for testing and single-node deployments
//! - Bounded Moka cache implementation
//! - Tiered store writing through to several backing caches
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             rsdispatch-storage               │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs  - SessionStore trait definition │
//! │  memory.rs  - DashMap-backed implementation │
//! │  cache.rs   - Moka-backed implementation    │
//! │  tiered.rs  - Write-through over N stores   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod memory;
pub mod tiered;
pub mod traits;

// Re-export commonly used types
pub use cache::{CacheSessionStore, CacheSessionStoreConfig};
pub use error::{StorageError, StorageResult};
pub use memory::MemorySessionStore;
pub use tiered::TieredSessionStore;
pub use traits::{validate_key, SessionStore, MAX_KEY_LENGTH};
