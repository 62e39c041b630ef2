//! Delivery provider trait and shared error types.

use herald_core::{Channel, EnrichedEvent, Role};
use serde_json::{Map, Value};

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider rejected delivery: {0}")]
    Rejected(String),

    #[error("Queue error: {0}")]
    Queue(#[from] herald_bus::BusError),
}

/// One event rendered for a single channel, ready for a provider.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Delivery {
    pub channel: Channel,
    pub event_type: String,
    pub actor_role: Role,
    pub recipients: Vec<String>,
    /// Absent for channels without a title line (SMS).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    pub recipient_roles: Vec<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Delivery {
    pub fn from_event(channel: Channel, event: &EnrichedEvent, subject: Option<String>) -> Self {
        Self {
            channel,
            event_type: event.event_type.clone(),
            actor_role: event.actor_role,
            recipients: event.recipients.clone(),
            subject,
            body: event.body.clone(),
            recipient_roles: event.recipient_roles.clone(),
            metadata: event.metadata.clone(),
        }
    }
}

/// Backend that actually moves a delivery to its recipients.
#[async_trait::async_trait]
pub trait DeliveryProvider: Send + Sync {
    async fn deliver(&self, delivery: &Delivery) -> Result<(), NotifyError>;

    /// Human-readable name for this provider (e.g., "smtp", "webhook").
    fn provider_name(&self) -> &str;
}
