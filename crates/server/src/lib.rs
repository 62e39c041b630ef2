//! HTTP front door for herald.
//!
//! Accepts notification requests, enriches them against the rule table and
//! publishes them to the broker. The router is exposed for the binary and
//! for integration tests.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
