//! notify-worker: standalone consumer delivering herald notifications.
//!
//! Connects a PULL socket to the broker backend (`BROKER_CONSUME_URL`),
//! decodes each envelope and fans it out to email, sms, push and in-app
//! providers configured from the environment.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use herald_bus::{Transport, ZmqQueueReceiver};
use herald_core::Config;
use herald_notify::{Dispatcher, NotificationConsumer};

/// Notification worker: consumes from the broker and delivers per channel.
#[derive(Parser, Debug)]
#[command(name = "notify-worker", version, about)]
struct Cli {
    /// Broker backend to consume from (overrides BROKER_CONSUME_URL).
    #[arg(long)]
    consume_url: Option<String>,

    /// Envelopes processed concurrently (overrides BROKER_PREFETCH_COUNT).
    #[arg(long)]
    prefetch: Option<u16>,

    /// Config profile (e.g. PROD).
    #[arg(long, env = "HERALD_PROFILE", default_value = "")]
    profile: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    herald_core::config::load_dotenv();

    let cli = Cli::parse();
    let config = Config::for_profile(&cli.profile);
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();
    config.log_summary();

    let consume_url = cli.consume_url.unwrap_or_else(|| config.broker.consume_url.clone());
    let transport = Transport::parse(&consume_url)
        .with_context(|| format!("notify-worker needs a broker socket, got '{consume_url}'"))?;
    let prefetch = cli.prefetch.unwrap_or(config.broker.prefetch_count);

    let dispatcher = Arc::new(Dispatcher::from_config(&config)?);
    let receiver = Arc::new(ZmqQueueReceiver::connect(&transport).await?);
    let consumer = NotificationConsumer::new(receiver, dispatcher, prefetch);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    info!(queue = %config.broker.queue, endpoint = %transport, "notify-worker starting");
    consumer.run(shutdown_rx).await?;
    info!("notify-worker exited cleanly");

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
