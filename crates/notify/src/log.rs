//! Provider that writes deliveries to the log instead of sending them.
//!
//! Used for channels without a configured backend, and in tests.

use crate::traits::{Delivery, DeliveryProvider, NotifyError};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogProvider;

impl LogProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl DeliveryProvider for LogProvider {
    async fn deliver(&self, delivery: &Delivery) -> Result<(), NotifyError> {
        let roles: Vec<&str> = delivery.recipient_roles.iter().map(|r| r.as_str()).collect();
        tracing::info!(
            channel = %delivery.channel,
            event_type = %delivery.event_type,
            actor_role = %delivery.actor_role,
            "Sending {} notification for event {} triggered by {} targeting roles {:?} to {} recipient(s)",
            delivery.channel,
            delivery.event_type,
            delivery.actor_role,
            roles,
            delivery.recipients.len(),
        );
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "log"
    }
}
