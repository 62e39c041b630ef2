//! One handler per delivery channel.
//!
//! A handler turns an [`EnrichedEvent`] into the [`Delivery`] its channel
//! needs and passes it to the provider behind it. Handlers never fail the
//! caller: every outcome becomes a [`ChannelDispatchResult`].

use std::sync::Arc;
use std::time::Instant;

use herald_core::{Channel, ChannelId, EnrichedEvent};
use serde::Serialize;

use crate::traits::{Delivery, DeliveryProvider, NotifyError};

/// Outcome of one channel send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchKind {
    Success,
    /// No handler is registered for the channel.
    UnsupportedChannel,
    ProviderFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDispatchResult {
    pub channel: ChannelId,
    pub kind: DispatchKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ChannelDispatchResult {
    pub fn unsupported(channel: impl Into<ChannelId>) -> Self {
        let channel = channel.into();
        Self {
            error: Some(format!("no handler registered for channel '{channel}'")),
            channel,
            kind: DispatchKind::UnsupportedChannel,
            provider: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == DispatchKind::Success
    }
}

macro_rules! channel_handler {
    ($(#[$doc:meta])* $name:ident, $channel:expr, $subject:expr) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name {
            provider: Arc<dyn DeliveryProvider>,
        }

        impl $name {
            pub fn new(provider: Arc<dyn DeliveryProvider>) -> Self {
                Self { provider }
            }

            pub fn render(&self, event: &EnrichedEvent) -> Delivery {
                let subject: fn(&EnrichedEvent) -> Option<String> = $subject;
                Delivery::from_event($channel, event, subject(event))
            }

            pub async fn send(&self, event: &EnrichedEvent) -> Result<(), NotifyError> {
                self.provider.deliver(&self.render(event)).await
            }

            pub fn provider_name(&self) -> &str {
                self.provider.provider_name()
            }
        }
    };
}

channel_handler!(
    /// Email carries subject and body to every recipient address.
    EmailHandler,
    Channel::Email,
    |event| Some(event.subject.clone())
);

channel_handler!(
    /// SMS has no subject line; only the body is sent.
    SmsHandler,
    Channel::Sms,
    |_| None
);

channel_handler!(
    /// Push uses the subject as the notification title.
    PushHandler,
    Channel::Push,
    |event| Some(event.subject.clone())
);

channel_handler!(
    InAppHandler,
    Channel::InApp,
    |event| Some(event.subject.clone())
);

/// Closed set of channel handlers, one variant per [`Channel`].
#[derive(Clone)]
pub enum ChannelHandler {
    Email(EmailHandler),
    Sms(SmsHandler),
    Push(PushHandler),
    InApp(InAppHandler),
}

impl ChannelHandler {
    /// Build the handler for `channel` on top of `provider`.
    pub fn for_channel(channel: Channel, provider: Arc<dyn DeliveryProvider>) -> Self {
        match channel {
            Channel::Email => Self::Email(EmailHandler::new(provider)),
            Channel::Sms => Self::Sms(SmsHandler::new(provider)),
            Channel::Push => Self::Push(PushHandler::new(provider)),
            Channel::InApp => Self::InApp(InAppHandler::new(provider)),
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            Self::Email(_) => Channel::Email,
            Self::Sms(_) => Channel::Sms,
            Self::Push(_) => Channel::Push,
            Self::InApp(_) => Channel::InApp,
        }
    }

    pub fn provider_name(&self) -> &str {
        match self {
            Self::Email(h) => h.provider_name(),
            Self::Sms(h) => h.provider_name(),
            Self::Push(h) => h.provider_name(),
            Self::InApp(h) => h.provider_name(),
        }
    }

    /// Send `event` on this channel and report how it went.
    pub async fn send(&self, event: &EnrichedEvent) -> ChannelDispatchResult {
        let start = Instant::now();
        let result = match self {
            Self::Email(h) => h.send(event).await,
            Self::Sms(h) => h.send(event).await,
            Self::Push(h) => h.send(event).await,
            Self::InApp(h) => h.send(event).await,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let (kind, error) = match result {
            Ok(()) => (DispatchKind::Success, None),
            Err(e) => (DispatchKind::ProviderFailure, Some(e.to_string())),
        };

        ChannelDispatchResult {
            channel: self.channel().into(),
            kind,
            provider: Some(self.provider_name().to_string()),
            error,
            duration_ms,
        }
    }
}
