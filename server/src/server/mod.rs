//! HTTP server wiring.
//!
//! - Application state shared by every handler
//! - Router with all endpoints and layers
//! - Readiness probe

pub mod health;
pub mod routes;
pub mod state;

pub use health::readiness_check;
pub use routes::build_router;
pub use state::AppState;
