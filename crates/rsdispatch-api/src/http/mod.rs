//! HTTP binding.
//!
//! Everything under `/v{N}/...` is handed to the dispatcher unchanged; the
//! router only owns the operational endpoints.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/health` | GET | Liveness probe |
//! | `/ready` | GET | Session store reachability |
//! | anything else | any | Dispatched through the pipeline |

pub mod routes;
pub mod state;

pub use routes::{create_router, create_router_with_observability, inbound_call, into_response};
pub use state::AppState;
