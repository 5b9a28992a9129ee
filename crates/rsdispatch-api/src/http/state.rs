//! Application state for HTTP handlers.

use std::sync::Arc;

use rsdispatch_server::Dispatcher;

/// State shared by every HTTP handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The dispatcher every resource call is funnelled through.
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}
