use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BusError;
use crate::message::Envelope;

/// Hands envelopes to the broker.
///
/// One call is one message; implementations do not batch.
#[async_trait]
pub trait QueueSender: Send + Sync {
    async fn send(&self, envelope: Envelope) -> Result<(), BusError>;
}

/// Blanket implementation so `Arc<dyn QueueSender>` can be used directly.
#[async_trait]
impl<T: QueueSender + ?Sized> QueueSender for Arc<T> {
    async fn send(&self, envelope: Envelope) -> Result<(), BusError> {
        (**self).send(envelope).await
    }
}

/// Pulls envelopes from the broker.
///
/// When several receivers share one queue, each envelope goes to exactly
/// one of them.
#[async_trait]
pub trait QueueReceiver: Send + Sync {
    /// Receive the next envelope. Blocks until one is available.
    async fn recv(&self) -> Result<Envelope, BusError>;
}

#[async_trait]
impl<T: QueueReceiver + ?Sized> QueueReceiver for Arc<T> {
    async fn recv(&self) -> Result<Envelope, BusError> {
        (**self).recv().await
    }
}
