//! In-process queue for single-process deployments and tests.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::error::BusError;
use crate::message::Envelope;
use crate::routing::Binding;
use crate::traits::{QueueReceiver, QueueSender};

/// Create a bounded in-memory queue. `send` waits while the queue is full.
pub fn memory_queue(capacity: usize) -> (MemoryQueueSender, MemoryQueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        MemoryQueueSender { tx, binding: None },
        MemoryQueueReceiver { rx: Mutex::new(rx) },
    )
}

#[derive(Clone)]
pub struct MemoryQueueSender {
    tx: mpsc::Sender<Envelope>,
    binding: Option<Binding>,
}

impl MemoryQueueSender {
    /// Only enqueue envelopes the binding routes; `send` rejects the rest
    /// with [`BusError::Unroutable`].
    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = Some(binding);
        self
    }
}

#[async_trait]
impl QueueSender for MemoryQueueSender {
    async fn send(&self, envelope: Envelope) -> Result<(), BusError> {
        if let Some(binding) = &self.binding {
            if !binding.routes(&envelope) {
                warn!(
                    exchange = %envelope.exchange,
                    routing_key = %envelope.routing_key,
                    "unroutable envelope rejected"
                );
                return Err(BusError::Unroutable {
                    exchange: envelope.exchange,
                    routing_key: envelope.routing_key,
                });
            }
        }
        self.tx.send(envelope).await.map_err(|_| BusError::Closed)
    }
}

pub struct MemoryQueueReceiver {
    rx: Mutex<mpsc::Receiver<Envelope>>,
}

#[async_trait]
impl QueueReceiver for MemoryQueueReceiver {
    async fn recv(&self) -> Result<Envelope, BusError> {
        self.rx.lock().await.recv().await.ok_or(BusError::Closed)
    }
}
