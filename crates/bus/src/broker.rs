use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use zeromq::prelude::*;
use zeromq::{PullSocket, PushSocket, RepSocket, ZmqMessage};

use crate::error::BusError;
use crate::message::Envelope;
use crate::routing::Binding;
use crate::transport::Transport;

/// Poll interval for the shutdown flag.
const RECV_POLL: Duration = Duration::from_millis(100);

/// Upper bound on one hand-off to the consumer side.
const FORWARD_TIMEOUT: Duration = Duration::from_millis(250);

const DEFAULT_MAX_BACKLOG: usize = 10_000;

/// Distinct routing keys counted individually; the rest share [`OTHER_ROUTING_KEYS`].
const MAX_TRACKED_ROUTING_KEYS: usize = 256;
pub const OTHER_ROUTING_KEYS: &str = "(other)";

/// Counters collected while routing envelopes.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    pub received: AtomicU64,
    pub forwarded: AtomicU64,
    /// Envelopes whose exchange or routing key did not match the binding.
    pub unroutable: AtomicU64,
    /// Frames that did not decode as an envelope.
    pub malformed: AtomicU64,
    /// Envelopes evicted because the backlog was full.
    pub dropped: AtomicU64,
    /// Per-routing-key counts of routed envelopes, capped at
    /// `MAX_TRACKED_ROUTING_KEYS` distinct keys.
    pub routing_key_counts: Mutex<HashMap<String, u64>>,
}

impl BrokerMetrics {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn unroutable(&self) -> u64 {
        self.unroutable.load(Ordering::Relaxed)
    }

    pub async fn record_routing_key(&self, routing_key: &str) {
        let mut counts = self.routing_key_counts.lock().await;
        let key = if counts.contains_key(routing_key) || counts.len() < MAX_TRACKED_ROUTING_KEYS {
            routing_key
        } else {
            OTHER_ROUTING_KEYS
        };
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
}

/// Configuration for the queue broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Publishers connect PUSH here (broker binds PULL).
    pub frontend: Transport,
    /// Consumers connect PULL here (broker binds PUSH).
    pub backend: Transport,
    /// REP socket answering liveness probes.
    pub health: Transport,
    /// The single queue this broker serves and its exchange binding.
    pub binding: Binding,
    /// Envelopes held while no consumer is connected.
    pub max_backlog: usize,
}

impl BrokerConfig {
    /// Local IPC broker bound to the default notification topology.
    pub fn local() -> Self {
        Self {
            frontend: Transport::ipc("broker-frontend"),
            backend: Transport::ipc("broker-backend"),
            health: Transport::ipc("broker-health"),
            binding: Binding::new("notifications.exchange", "notifications.*"),
            max_backlog: DEFAULT_MAX_BACKLOG,
        }
    }

    pub fn tcp(host: &str, frontend_port: u16, backend_port: u16, health_port: u16) -> Self {
        Self {
            frontend: Transport::tcp(host, frontend_port),
            backend: Transport::tcp(host, backend_port),
            health: Transport::tcp(host, health_port),
            ..Self::local()
        }
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::local()
    }
}

/// Store-and-forward queue broker.
///
/// - Publishers connect to the **frontend** (PULL socket the broker binds).
/// - Consumers connect to the **backend** (PUSH socket the broker binds);
///   each envelope goes to one consumer, round-robin.
/// - Envelopes the binding does not route are counted and discarded.
/// - While no consumer is connected, routed envelopes wait in a bounded
///   backlog, oldest evicted first.
pub struct QueueBroker {
    config: BrokerConfig,
    metrics: Arc<BrokerMetrics>,
    shutdown: Arc<AtomicBool>,
}

impl QueueBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(BrokerMetrics::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn metrics(&self) -> &Arc<BrokerMetrics> {
        &self.metrics
    }

    /// Signal the broker to shut down gracefully.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Run the routing loop until shutdown is signaled.
    pub async fn run(&self) -> Result<(), BusError> {
        for transport in [&self.config.frontend, &self.config.backend, &self.config.health] {
            transport.prepare_bind()?;
        }

        let mut frontend = PullSocket::new();
        frontend.bind(&self.config.frontend.endpoint()).await?;
        tracing::info!(
            endpoint = %self.config.frontend.endpoint(),
            "broker frontend (PULL) bound, publishers connect here"
        );

        let mut backend = PushSocket::new();
        backend.bind(&self.config.backend.endpoint()).await?;
        tracing::info!(
            endpoint = %self.config.backend.endpoint(),
            "broker backend (PUSH) bound, consumers connect here"
        );

        let mut health = RepSocket::new();
        health.bind(&self.config.health.endpoint()).await?;
        tracing::info!(endpoint = %self.config.health.endpoint(), "broker health check (REP) bound");

        let shutdown_flag = self.shutdown.clone();
        tokio::spawn(async move {
            Self::health_loop(&mut health, &shutdown_flag).await;
        });

        let metrics = self.metrics.clone();
        let binding = &self.config.binding;
        let mut backlog: VecDeque<Vec<u8>> = VecDeque::new();

        tracing::info!(
            exchange = %binding.exchange,
            binding = %binding.pattern,
            "broker routing loop started"
        );

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::info!("broker shutting down");
                break;
            }

            // Oldest first, stop at the first failed hand-off.
            while let Some(bytes) = backlog.front() {
                if !forward(&mut backend, bytes.clone()).await {
                    break;
                }
                backlog.pop_front();
                metrics.forwarded.fetch_add(1, Ordering::Relaxed);
            }

            let msg = match tokio::time::timeout(RECV_POLL, frontend.recv()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "frontend recv error");
                    continue;
                }
                Err(_) => continue,
            };

            let Some(frame) = msg.get(0) else {
                metrics.malformed.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            let bytes = frame.to_vec();
            metrics.received.fetch_add(1, Ordering::Relaxed);

            let envelope = match Envelope::from_bytes(&bytes) {
                Ok(envelope) => envelope,
                Err(e) => {
                    metrics.malformed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, "discarding undecodable frame");
                    continue;
                }
            };

            if !binding.routes(&envelope) {
                metrics.unroutable.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    message_id = %envelope.message_id,
                    exchange = %envelope.exchange,
                    routing_key = %envelope.routing_key,
                    "unroutable envelope discarded"
                );
                continue;
            }
            metrics.record_routing_key(&envelope.routing_key).await;

            tracing::debug!(
                message_id = %envelope.message_id,
                routing_key = %envelope.routing_key,
                "routing envelope"
            );

            if backlog.is_empty() && forward(&mut backend, bytes.clone()).await {
                metrics.forwarded.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            backlog.push_back(bytes);
            if backlog.len() > self.config.max_backlog {
                backlog.pop_front();
                metrics.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(max_backlog = self.config.max_backlog, "backlog full, oldest envelope dropped");
            }
        }

        tracing::info!(
            received = metrics.received(),
            forwarded = metrics.forwarded(),
            unroutable = metrics.unroutable(),
            pending = backlog.len(),
            "broker stopped"
        );

        Ok(())
    }

    /// Health check responder loop, replies "ok" to any REQ.
    async fn health_loop(health: &mut RepSocket, shutdown: &AtomicBool) {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            match tokio::time::timeout(Duration::from_millis(500), health.recv()).await {
                Ok(Ok(_request)) => {
                    let reply: ZmqMessage = "ok".into();
                    if let Err(e) = health.send(reply).await {
                        tracing::warn!(error = %e, "health reply error");
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "health recv error");
                }
                Err(_) => {}
            }
        }
    }
}

/// Push one envelope to a consumer. `false` when none accepted it.
async fn forward(backend: &mut PushSocket, bytes: Vec<u8>) -> bool {
    match tokio::time::timeout(FORWARD_TIMEOUT, backend.send(bytes.into())).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "no consumer accepted envelope, holding in backlog");
            false
        }
        Err(_) => {
            tracing::debug!("consumer hand-off timed out, holding in backlog");
            false
        }
    }
}
