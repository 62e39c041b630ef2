//! Pulls notification envelopes off the queue and dispatches them.
//!
//! At most `prefetch` envelopes are in flight at once; the next one is not
//! pulled until a slot frees up. Envelopes that do not decode as a
//! [`QueuedEvent`] are logged and dropped; an unknown channel id only costs
//! that one channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use herald_bus::{BusError, Envelope, QueueReceiver};
use herald_core::QueuedEvent;
use serde::Serialize;
use tokio::sync::{watch, Semaphore};

use crate::dispatcher::Dispatcher;
use crate::handlers::{ChannelDispatchResult, DispatchKind};
use crate::traits::NotifyError;

/// Maximum consecutive receive errors before the consumer gives up.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

const BASE_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How long in-flight dispatches may run after the loop stops.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Running totals for one consumer.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    dispatched: AtomicU64,
    undecodable: AtomicU64,
    channel_successes: AtomicU64,
    channel_failures: AtomicU64,
    unsupported: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub received: u64,
    pub dispatched: u64,
    pub undecodable: u64,
    pub channel_successes: u64,
    pub channel_failures: u64,
    pub unsupported: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            undecodable: self.undecodable.load(Ordering::Relaxed),
            channel_successes: self.channel_successes.load(Ordering::Relaxed),
            channel_failures: self.channel_failures.load(Ordering::Relaxed),
            unsupported: self.unsupported.load(Ordering::Relaxed),
        }
    }

    fn record(&self, results: &[ChannelDispatchResult]) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        for result in results {
            let counter = match result.kind {
                DispatchKind::Success => &self.channel_successes,
                DispatchKind::ProviderFailure => &self.channel_failures,
                DispatchKind::UnsupportedChannel => &self.unsupported,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub struct NotificationConsumer {
    receiver: Arc<dyn QueueReceiver>,
    dispatcher: Arc<Dispatcher>,
    prefetch: Arc<Semaphore>,
    prefetch_count: u32,
    stats: Arc<ConsumerStats>,
}

impl NotificationConsumer {
    pub fn new(receiver: Arc<dyn QueueReceiver>, dispatcher: Arc<Dispatcher>, prefetch: u16) -> Self {
        let prefetch = prefetch.max(1);
        Self {
            receiver,
            dispatcher,
            prefetch: Arc::new(Semaphore::new(usize::from(prefetch))),
            prefetch_count: u32::from(prefetch),
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    /// Decode and dispatch one envelope. `None` when it was dropped.
    pub async fn handle_envelope(&self, envelope: Envelope) -> Option<Vec<ChannelDispatchResult>> {
        process(&self.dispatcher, &self.stats, envelope).await
    }

    /// Consume until `shutdown` flips to `true` or the queue closes.
    ///
    /// Transport errors back off exponentially; after
    /// [`MAX_CONSECUTIVE_ERRORS`] in a row the consumer stops with an error.
    /// In-flight dispatches get [`DRAIN_GRACE`] to finish; whatever is still
    /// running after that is abandoned.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), NotifyError> {
        let mut consecutive_errors: u32 = 0;
        tracing::info!(
            prefetch = self.prefetch.available_permits(),
            channels = ?self.dispatcher.channels(),
            "notification consumer started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Hold a prefetch slot before pulling the next envelope.
            let permit = tokio::select! {
                _ = shutdown.changed() => break,
                permit = self.prefetch.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.receiver.recv() => received,
            };

            match received {
                Ok(envelope) => {
                    consecutive_errors = 0;
                    let dispatcher = self.dispatcher.clone();
                    let stats = self.stats.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        process(&dispatcher, &stats, envelope).await;
                    });
                }
                Err(BusError::Closed) => {
                    tracing::info!("queue closed, consumer stopping");
                    break;
                }
                Err(BusError::Decode(e)) => {
                    self.stats.received.fetch_add(1, Ordering::Relaxed);
                    self.stats.undecodable.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, "dropping undecodable frame");
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        tracing::error!(
                            error = %e,
                            consecutive_errors,
                            "Too many consecutive receive errors, stopping consumer"
                        );
                        return Err(NotifyError::Queue(e));
                    }

                    let backoff = (BASE_BACKOFF * 2u32.pow(consecutive_errors.min(5))).min(MAX_BACKOFF);
                    tracing::warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_ms = backoff.as_millis() as u64,
                        "Receive error, backing off"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        // Every slot back means nothing is in flight.
        if tokio::time::timeout(DRAIN_GRACE, self.prefetch.acquire_many(self.prefetch_count))
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = self.prefetch_count as usize - self.prefetch.available_permits(),
                "abandoning in-flight dispatches"
            );
        }

        let s = self.stats.snapshot();
        tracing::info!(
            received = s.received,
            dispatched = s.dispatched,
            undecodable = s.undecodable,
            "notification consumer stopped"
        );
        Ok(())
    }
}

async fn process(
    dispatcher: &Dispatcher,
    stats: &ConsumerStats,
    envelope: Envelope,
) -> Option<Vec<ChannelDispatchResult>> {
    stats.received.fetch_add(1, Ordering::Relaxed);

    let event: QueuedEvent = match envelope.decode_json() {
        Ok(event) => event,
        Err(e) => {
            stats.undecodable.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                message_id = %envelope.message_id,
                routing_key = %envelope.routing_key,
                error = %e,
                "dropping undecodable notification"
            );
            return None;
        }
    };

    tracing::debug!(
        message_id = %envelope.message_id,
        event_type = %event.event_type,
        channels = event.channels.len(),
        "dispatching notification"
    );
    let results = dispatcher.dispatch_queued(event).await;
    stats.record(&results);
    Some(results)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use herald_bus::{memory_queue, QueueSender};
    use herald_core::{Channel, EnrichedEvent, Role};
    use tokio::sync::Mutex;

    use super::*;
    use crate::handlers::ChannelHandler;
    use crate::traits::{Delivery, DeliveryProvider};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<Delivery>>,
    }

    #[async_trait::async_trait]
    impl DeliveryProvider for Recording {
        async fn deliver(&self, delivery: &Delivery) -> Result<(), NotifyError> {
            self.seen.lock().await.push(delivery.clone());
            Ok(())
        }

        fn provider_name(&self) -> &str {
            "recording"
        }
    }

    /// Fails with a transport error a fixed number of times, then reports closed.
    struct FlakyReceiver {
        failures: AtomicUsize,
        limit: usize,
    }

    #[async_trait::async_trait]
    impl QueueReceiver for FlakyReceiver {
        async fn recv(&self) -> Result<Envelope, BusError> {
            if self.failures.fetch_add(1, Ordering::SeqCst) < self.limit {
                Err(BusError::Transport("socket reset".into()))
            } else {
                Err(BusError::Closed)
            }
        }
    }

    fn event(event_type: &str) -> EnrichedEvent {
        EnrichedEvent {
            event_type: event_type.into(),
            actor_role: Role::Issuer,
            recipients: vec!["a@x.com".into()],
            subject: "S".into(),
            body: "B".into(),
            channels: vec![Channel::Email, Channel::InApp],
            recipient_roles: vec![Role::Learner],
            metadata: None,
        }
    }

    fn envelope(event: &EnrichedEvent) -> Envelope {
        Envelope::json("notifications.exchange", "notifications.broadcast", event).unwrap()
    }

    fn recording_dispatcher() -> (Arc<Dispatcher>, Arc<Recording>) {
        let provider = Arc::new(Recording::default());
        let dispatcher = Dispatcher::new(4)
            .with_handler(ChannelHandler::for_channel(Channel::Email, provider.clone()))
            .with_handler(ChannelHandler::for_channel(Channel::InApp, provider.clone()));
        (Arc::new(dispatcher), provider)
    }

    #[tokio::test]
    async fn handle_envelope_dispatches_decoded_event() {
        let (_tx, rx) = memory_queue(1);
        let (dispatcher, provider) = recording_dispatcher();
        let consumer = NotificationConsumer::new(Arc::new(rx), dispatcher, 4);

        let results = consumer
            .handle_envelope(envelope(&event("credential.issued")))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(provider.seen.lock().await.len(), 2);
        let stats = consumer.stats().snapshot();
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.channel_successes, 2);
    }

    #[tokio::test]
    async fn unknown_channel_does_not_drop_the_event() {
        let (_tx, rx) = memory_queue(1);
        let (dispatcher, provider) = recording_dispatcher();
        let consumer = NotificationConsumer::new(Arc::new(rx), dispatcher, 4);

        let mut payload = serde_json::to_value(event("credential.issued")).unwrap();
        payload["channels"] = serde_json::json!(["email", "fax"]);
        let env =
            Envelope::json("notifications.exchange", "notifications.broadcast", &payload).unwrap();

        let results = consumer.handle_envelope(env).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert_eq!(results[1].kind, DispatchKind::UnsupportedChannel);
        assert_eq!(results[1].channel.as_str(), "fax");

        let seen = provider.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].channel, Channel::Email);

        let stats = consumer.stats().snapshot();
        assert_eq!(stats.undecodable, 0);
        assert_eq!(stats.channel_successes, 1);
        assert_eq!(stats.unsupported, 1);
    }

    #[tokio::test]
    async fn undecodable_payload_is_dropped() {
        let (_tx, rx) = memory_queue(1);
        let (dispatcher, provider) = recording_dispatcher();
        let consumer = NotificationConsumer::new(Arc::new(rx), dispatcher, 4);

        let bogus = Envelope::json("notifications.exchange", "notifications.broadcast", &42).unwrap();
        assert!(consumer.handle_envelope(bogus).await.is_none());
        assert!(provider.seen.lock().await.is_empty());

        let stats = consumer.stats().snapshot();
        assert_eq!(stats.received, 1);
        assert_eq!(stats.undecodable, 1);
        assert_eq!(stats.dispatched, 0);
    }

    #[tokio::test]
    async fn run_drains_queue_until_closed() {
        let (tx, rx) = memory_queue(16);
        let (dispatcher, provider) = recording_dispatcher();
        let consumer = NotificationConsumer::new(Arc::new(rx), dispatcher, 2);

        for n in 0..5 {
            tx.send(envelope(&event(&format!("event.{n}")))).await.unwrap();
        }
        drop(tx);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::time::timeout(TIMEOUT, consumer.run(shutdown_rx))
            .await
            .expect("consumer did not stop")
            .unwrap();

        assert_eq!(provider.seen.lock().await.len(), 10);
        let stats = consumer.stats().snapshot();
        assert_eq!(stats.received, 5);
        assert_eq!(stats.dispatched, 5);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let (tx, rx) = memory_queue(4);
        let (dispatcher, _provider) = recording_dispatcher();
        let consumer = Arc::new(NotificationConsumer::new(Arc::new(rx), dispatcher, 4));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = consumer.clone();
        let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

        tx.send(envelope(&event("credential.updated"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert_eq!(consumer.stats().snapshot().dispatched, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_from_transient_receive_errors() {
        let receiver = FlakyReceiver {
            failures: AtomicUsize::new(0),
            limit: 3,
        };
        let (dispatcher, _provider) = recording_dispatcher();
        let consumer = NotificationConsumer::new(Arc::new(receiver), dispatcher, 1);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        assert!(consumer.run(shutdown_rx).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_repeated_receive_errors() {
        let receiver = FlakyReceiver {
            failures: AtomicUsize::new(0),
            limit: usize::MAX,
        };
        let (dispatcher, _provider) = recording_dispatcher();
        let consumer = NotificationConsumer::new(Arc::new(receiver), dispatcher, 1);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        assert!(matches!(
            consumer.run(shutdown_rx).await,
            Err(NotifyError::Queue(BusError::Transport(_)))
        ));
    }
}
