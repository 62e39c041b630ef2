//! Routes enriched events to their channel handlers.
//!
//! Every channel listed on the event is attempted exactly once. Sends run
//! concurrently up to the configured limit, and one channel failing never
//! blocks the others. Results come back in the event's channel order.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use herald_core::{Channel, ChannelId, Config, EnrichedEvent, QueuedEvent};
use tokio::sync::Semaphore;

use crate::email::SmtpProvider;
use crate::handlers::{ChannelDispatchResult, ChannelHandler};
use crate::log::LogProvider;
use crate::traits::{DeliveryProvider, NotifyError};
use crate::webhook::WebhookProvider;

pub struct Dispatcher {
    handlers: HashMap<Channel, ChannelHandler>,
    /// Bounds concurrent channel sends across all events.
    limit: Arc<Semaphore>,
}

impl Dispatcher {
    /// Create a dispatcher with no handlers registered.
    pub fn new(concurrency: usize) -> Self {
        Self {
            handlers: HashMap::new(),
            limit: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Every channel backed by [`LogProvider`].
    pub fn logging(concurrency: usize) -> Self {
        let provider: Arc<dyn DeliveryProvider> = Arc::new(LogProvider::new());
        Channel::ALL
            .into_iter()
            .fold(Self::new(concurrency), |d, channel| {
                d.with_handler(ChannelHandler::for_channel(channel, provider.clone()))
            })
    }

    /// Build handlers from provider configuration.
    ///
    /// Email goes through SMTP when configured, SMS and push through their
    /// webhooks. Channels without a backend fall back to the log provider
    /// when `log_fallback` is on, and stay unregistered otherwise.
    pub fn from_config(config: &Config) -> Result<Self, NotifyError> {
        let providers = &config.providers;
        let fallback: Option<Arc<dyn DeliveryProvider>> = providers
            .log_fallback
            .then(|| Arc::new(LogProvider::new()) as Arc<dyn DeliveryProvider>);

        let email: Option<Arc<dyn DeliveryProvider>> = match &providers.smtp {
            Some(smtp) => Some(Arc::new(SmtpProvider::from_config(smtp)?)),
            None => fallback.clone(),
        };
        let sms = webhook_or(
            providers.sms_webhook_url.as_deref(),
            &providers.webhook_token,
            &fallback,
        )?;
        let push = webhook_or(
            providers.push_webhook_url.as_deref(),
            &providers.webhook_token,
            &fallback,
        )?;

        let mut dispatcher = Self::new(config.worker.concurrency);
        for (channel, provider) in [
            (Channel::Email, email),
            (Channel::Sms, sms),
            (Channel::Push, push),
            (Channel::InApp, fallback),
        ] {
            match provider {
                Some(provider) => {
                    tracing::info!(
                        channel = %channel,
                        provider = provider.provider_name(),
                        "channel handler registered"
                    );
                    dispatcher.register(ChannelHandler::for_channel(channel, provider));
                }
                None => tracing::warn!(channel = %channel, "no provider configured for channel"),
            }
        }
        Ok(dispatcher)
    }

    pub fn with_handler(mut self, handler: ChannelHandler) -> Self {
        self.register(handler);
        self
    }

    /// Register (or replace) the handler for its channel.
    pub fn register(&mut self, handler: ChannelHandler) {
        self.handlers.insert(handler.channel(), handler);
    }

    /// Channels that have a handler, in canonical order.
    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.handlers.contains_key(c))
            .collect()
    }

    /// Send `event` to every channel it lists.
    pub async fn dispatch(&self, event: &EnrichedEvent) -> Vec<ChannelDispatchResult> {
        let ids: Vec<ChannelId> = event.channels.iter().map(|&c| c.into()).collect();
        self.fan_out(event, &ids).await
    }

    /// Dispatch an event read off the queue. Channel ids this build does not
    /// know come back as unsupported alongside the others.
    pub async fn dispatch_queued(&self, queued: QueuedEvent) -> Vec<ChannelDispatchResult> {
        let (event, ids) = queued.into_parts();
        self.fan_out(&event, &ids).await
    }

    async fn fan_out(&self, event: &EnrichedEvent, ids: &[ChannelId]) -> Vec<ChannelDispatchResult> {
        let sends = ids.iter().map(|id| async move {
            let handler = match id {
                ChannelId::Known(channel) => self.handlers.get(channel),
                ChannelId::Unknown(_) => None,
            };
            let Some(handler) = handler else {
                tracing::warn!(
                    channel = %id,
                    event_type = %event.event_type,
                    "Unsupported channel, skipping"
                );
                return ChannelDispatchResult::unsupported(id.clone());
            };

            // The semaphore is never closed.
            let _permit = self.limit.acquire().await.ok();
            let result = handler.send(event).await;

            match &result.error {
                None => tracing::info!(
                    channel = %id,
                    event_type = %event.event_type,
                    duration_ms = result.duration_ms,
                    "Notification delivered"
                ),
                Some(error) => tracing::warn!(
                    channel = %id,
                    event_type = %event.event_type,
                    error = %error,
                    duration_ms = result.duration_ms,
                    "Notification delivery failed"
                ),
            }
            result
        });

        join_all(sends).await
    }
}

fn webhook_or(
    url: Option<&str>,
    token: &Option<String>,
    fallback: &Option<Arc<dyn DeliveryProvider>>,
) -> Result<Option<Arc<dyn DeliveryProvider>>, NotifyError> {
    match url {
        Some(url) => Ok(Some(Arc::new(WebhookProvider::new(url, token.clone())?))),
        None => Ok(fallback.clone()),
    }
}
