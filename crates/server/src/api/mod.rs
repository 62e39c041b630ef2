//! API endpoint modules.

pub mod doc;
mod health;
mod notifications;

pub use health::{health, HealthResponse};
pub use notifications::{create_notification, list_rules, AcceptedResponse, RulesResponse};
