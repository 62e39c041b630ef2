//! Consumer-side delivery for herald.
//!
//! This crate provides:
//! - `DeliveryProvider` trait for pluggable delivery backends
//! - Logging, SMTP (`lettre`) and HTTP webhook (`reqwest`) providers
//! - One handler per channel, unified in the `ChannelHandler` enum
//! - `Dispatcher` fanning an enriched event out to its channels
//! - `NotificationConsumer` pulling envelopes from the queue

pub mod consumer;
pub mod dispatcher;
pub mod email;
pub mod handlers;
pub mod log;
pub mod traits;
pub mod webhook;

pub use consumer::{ConsumerStats, ConsumerStatsSnapshot, NotificationConsumer};
pub use dispatcher::Dispatcher;
pub use handlers::{
    ChannelDispatchResult, ChannelHandler, DispatchKind, EmailHandler, InAppHandler, PushHandler,
    SmsHandler,
};
pub use traits::{Delivery, DeliveryProvider, NotifyError};
