//! Publishes enriched notification events to the broker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_core::{Config, EnrichedEvent};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::BusError;
use crate::message::Envelope;
use crate::traits::QueueSender;

/// Header carrying the event type, so consumers can filter without decoding.
pub const HEADER_EVENT_TYPE: &str = "event_type";
/// Header naming the service that published the envelope.
pub const HEADER_SOURCE: &str = "source";

/// The broker did not accept a message. Never retried here; the caller
/// decides whether to retry or alert.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("broker rejected message: {0}")]
    Broker(#[from] BusError),

    #[error("broker did not accept message within {0:?}")]
    Timeout(Duration),
}

/// Acknowledgement that the broker accepted one envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishReceipt {
    pub message_id: Uuid,
    pub exchange: String,
    pub routing_key: String,
    pub published_at: DateTime<Utc>,
}

/// Where and how envelopes are published.
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub exchange: String,
    pub routing_key: String,
    /// Value of the `source` header.
    pub source: String,
    pub timeout: Duration,
}

impl PublisherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exchange: config.broker.exchange.clone(),
            routing_key: config.broker.publish_routing_key.clone(),
            source: config.service.name.clone(),
            timeout: config.broker.publish_timeout(),
        }
    }
}

pub struct NotificationPublisher {
    sender: Arc<dyn QueueSender>,
    settings: PublisherSettings,
}

impl NotificationPublisher {
    pub fn new(sender: Arc<dyn QueueSender>, settings: PublisherSettings) -> Self {
        Self { sender, settings }
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    /// Wrap an event in a routed envelope with the standard headers.
    pub fn envelope(&self, event: &EnrichedEvent) -> Result<Envelope, serde_json::Error> {
        Ok(
            Envelope::json(&self.settings.exchange, &self.settings.routing_key, event)?
                .with_header(HEADER_EVENT_TYPE, &event.event_type)
                .with_header(HEADER_SOURCE, &self.settings.source),
        )
    }

    /// Hand one event to the broker.
    pub async fn publish(&self, event: &EnrichedEvent) -> Result<PublishReceipt, PublishError> {
        let envelope = self.envelope(event)?;
        let receipt = PublishReceipt {
            message_id: envelope.message_id,
            exchange: envelope.exchange.clone(),
            routing_key: envelope.routing_key.clone(),
            published_at: envelope.timestamp,
        };

        match tokio::time::timeout(self.settings.timeout, self.sender.send(envelope)).await {
            Ok(Ok(())) => {
                info!(
                    message_id = %receipt.message_id,
                    event_type = %event.event_type,
                    routing_key = %receipt.routing_key,
                    channels = event.channels.len(),
                    "notification published"
                );
                Ok(receipt)
            }
            Ok(Err(e)) => {
                warn!(event_type = %event.event_type, error = %e, "publish failed");
                Err(PublishError::Broker(e))
            }
            Err(_) => {
                warn!(
                    event_type = %event.event_type,
                    timeout_ms = self.settings.timeout.as_millis() as u64,
                    "publish timed out"
                );
                Err(PublishError::Timeout(self.settings.timeout))
            }
        }
    }
}
