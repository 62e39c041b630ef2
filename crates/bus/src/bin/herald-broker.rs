//! herald-broker: queue broker between notification publishers and consumers.
//!
//! Publishers PUSH envelopes to the frontend; the broker keeps those routed
//! by the queue binding and PUSHes them round-robin to consumers on the
//! backend. Provides a REP health check socket.
//!
//! # Usage
//!
//! ```bash
//! # TCP (default), matching the server's BROKER_URL / BROKER_CONSUME_URL defaults
//! herald-broker
//!
//! # Local IPC
//! herald-broker --transport ipc
//!
//! # Custom binding
//! BROKER_EXCHANGE=credapp.exchange BROKER_ROUTING_KEY='notifications.#' herald-broker
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use herald_bus::broker::{BrokerConfig, QueueBroker};
use herald_bus::routing::Binding;
use herald_bus::transport::Transport;

/// Queue broker for herald notifications.
#[derive(Parser, Debug)]
#[command(name = "herald-broker", version, about)]
struct Cli {
    /// Transport type: "tcp" or "ipc".
    #[arg(long, env = "HERALD_BROKER_TRANSPORT", default_value = "tcp")]
    transport: String,

    /// TCP host to bind to (only used with --transport tcp).
    #[arg(long, env = "HERALD_BROKER_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Frontend port, publishers connect here.
    #[arg(long, env = "HERALD_BROKER_FRONTEND_PORT", default_value_t = 5560)]
    frontend_port: u16,

    /// Backend port, consumers connect here.
    #[arg(long, env = "HERALD_BROKER_BACKEND_PORT", default_value_t = 5561)]
    backend_port: u16,

    /// Health check port.
    #[arg(long, env = "HERALD_BROKER_HEALTH_PORT", default_value_t = 5562)]
    health_port: u16,

    /// IPC socket name prefix (only used with --transport ipc).
    #[arg(long, env = "HERALD_BROKER_IPC_PREFIX", default_value = "broker")]
    ipc_prefix: String,

    /// Exchange whose envelopes this queue accepts.
    #[arg(long, env = "BROKER_EXCHANGE", default_value = "notifications.exchange")]
    exchange: String,

    /// Queue binding pattern (`*` = one word, `#` = zero or more).
    #[arg(long, env = "BROKER_ROUTING_KEY", default_value = "notifications.*")]
    binding: String,

    /// Envelopes held while no consumer is connected.
    #[arg(long, env = "HERALD_BROKER_MAX_BACKLOG", default_value_t = 10_000)]
    max_backlog: usize,

    /// Interval in seconds between metrics log lines (0 = disabled).
    #[arg(long, env = "HERALD_BROKER_METRICS_INTERVAL", default_value_t = 30)]
    metrics_interval: u64,
}

impl Cli {
    fn into_broker_config(self) -> BrokerConfig {
        let base = match self.transport.as_str() {
            "ipc" => BrokerConfig {
                frontend: Transport::ipc(&format!("{}-frontend", self.ipc_prefix)),
                backend: Transport::ipc(&format!("{}-backend", self.ipc_prefix)),
                health: Transport::ipc(&format!("{}-health", self.ipc_prefix)),
                ..BrokerConfig::local()
            },
            _ => BrokerConfig::tcp(
                &self.host,
                self.frontend_port,
                self.backend_port,
                self.health_port,
            ),
        };
        BrokerConfig {
            max_backlog: self.max_backlog,
            ..base.with_binding(Binding::new(self.exchange, self.binding))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    herald_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let metrics_interval = cli.metrics_interval;

    tracing::info!(?cli, "starting herald-broker");

    let broker = Arc::new(QueueBroker::new(cli.into_broker_config()));

    let broker_for_signal = broker.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        broker_for_signal.shutdown();
    });

    if metrics_interval > 0 {
        let metrics = broker.metrics().clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            loop {
                interval.tick().await;
                tracing::info!(
                    received = metrics.received(),
                    forwarded = metrics.forwarded(),
                    unroutable = metrics.unroutable(),
                    malformed = metrics.malformed.load(Ordering::Relaxed),
                    dropped = metrics.dropped.load(Ordering::Relaxed),
                    "broker metrics"
                );
                let counts = metrics.routing_key_counts.lock().await;
                for (routing_key, count) in counts.iter() {
                    tracing::debug!(routing_key = %routing_key, count, "routing key stats");
                }
            }
        });
    }

    broker.run().await?;

    tracing::info!("herald-broker exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl_c");
    }
}
