//! Shared data model, validation errors and process configuration for herald.

pub mod config;
pub mod error;
pub mod event;
pub mod routing;

pub use config::Config;
pub use error::*;
pub use event::*;
