//! Topic-exchange routing: a queue binds to one exchange with a pattern
//! matched by [`binding_matches`].

pub use herald_core::routing::binding_matches;
use serde::{Deserialize, Serialize};

use crate::message::Envelope;

/// A queue's binding to an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub exchange: String,
    pub pattern: String,
}

impl Binding {
    pub fn new(exchange: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            pattern: pattern.into(),
        }
    }

    /// Whether an envelope published to its exchange lands on this queue.
    pub fn routes(&self, envelope: &Envelope) -> bool {
        envelope.exchange == self.exchange && binding_matches(&self.pattern, &envelope.routing_key)
    }
}
