//! Queue transport for herald: broker envelope, ZeroMQ sockets, the queue
//! broker itself, an in-process queue, and the notification publisher.

pub mod broker;
pub mod error;
pub mod memory;
pub mod message;
pub mod pipeline;
pub mod publisher;
pub mod routing;
pub mod traits;
pub mod transport;

pub use broker::{BrokerConfig, BrokerMetrics, QueueBroker};
pub use error::BusError;
pub use memory::{memory_queue, MemoryQueueReceiver, MemoryQueueSender};
pub use message::Envelope;
pub use pipeline::{ZmqQueueReceiver, ZmqQueueSender};
pub use publisher::{NotificationPublisher, PublishError, PublishReceipt, PublisherSettings};
pub use routing::{binding_matches, Binding};
pub use traits::{QueueReceiver, QueueSender};
pub use transport::Transport;
