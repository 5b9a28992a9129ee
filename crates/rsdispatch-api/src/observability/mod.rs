//! Observability infrastructure.
//!
//! Structured logging configuration for the server binary. The dispatcher's
//! per-interaction entries reach the same subscriber through
//! `TracingReporter`.

mod logging;

pub use logging::{create_json_layer, init_logging, parse_log_level, LoggingConfig};
