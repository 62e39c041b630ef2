//! herald-server: HTTP intake for notifications.
//!
//! Enriches `POST /api/v1/notifications` requests and publishes them to the
//! broker at `BROKER_URL`. With `WORKER_EMBEDDED=true` (or a `memory://`
//! broker) a consumer runs in this process as well.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use herald_bus::{
    memory_queue, Binding, NotificationPublisher, PublisherSettings, QueueSender, Transport,
    ZmqQueueReceiver, ZmqQueueSender,
};
use herald_core::Config;
use herald_notify::{Dispatcher, NotificationConsumer};
use herald_rules::EnrichmentResolver;
use herald_server::{build_router, AppState};

/// Envelopes buffered per prefetch slot in the in-process queue.
const MEMORY_QUEUE_FACTOR: usize = 16;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    herald_core::config::load_dotenv();
    let config = Arc::new(Config::from_env());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    config.validate()?;
    config.log_summary();

    let (sender, consumer) = connect_broker(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_stats = consumer.as_ref().map(|c| c.stats());
    let consumer_task = consumer.map(|c| tokio::spawn(async move { c.run(shutdown_rx).await }));

    let state = Arc::new(AppState {
        config: config.clone(),
        resolver: EnrichmentResolver::default(),
        publisher: NotificationPublisher::new(sender, PublisherSettings::from_config(&config)),
        consumer_stats,
    });
    info!(rules = state.resolver.table().len(), "rule table loaded");

    let app = build_router(state);
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{addr} (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server stopped");

    let _ = shutdown_tx.send(true);
    if let Some(task) = consumer_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "embedded consumer exited with error"),
            Err(e) => warn!(error = %e, "embedded consumer task panicked"),
        }
    }

    info!("herald-server exited cleanly");
    Ok(())
}

/// Publisher side of the broker, plus the embedded consumer when enabled.
async fn connect_broker(
    config: &Config,
) -> anyhow::Result<(Arc<dyn QueueSender>, Option<NotificationConsumer>)> {
    let broker = &config.broker;

    if broker.is_in_memory() {
        if !config.worker.embedded {
            warn!("memory:// broker has no external consumers, running embedded consumer anyway");
        }
        let (tx, rx) = memory_queue(usize::from(broker.prefetch_count) * MEMORY_QUEUE_FACTOR);
        let tx = tx.with_binding(Binding::new(&broker.exchange, &broker.routing_key));
        let dispatcher = Arc::new(Dispatcher::from_config(config)?);
        let consumer = NotificationConsumer::new(Arc::new(rx), dispatcher, broker.prefetch_count);
        return Ok((Arc::new(tx), Some(consumer)));
    }

    let publish_to = Transport::parse(&broker.url).context("invalid BROKER_URL")?;
    let sender = ZmqQueueSender::connect(&publish_to).await?;

    let consumer = if config.worker.embedded {
        let consume_from =
            Transport::parse(&broker.consume_url).context("invalid BROKER_CONSUME_URL")?;
        let receiver = ZmqQueueReceiver::connect(&consume_from).await?;
        let dispatcher = Arc::new(Dispatcher::from_config(config)?);
        Some(NotificationConsumer::new(
            Arc::new(receiver),
            dispatcher,
            broker.prefetch_count,
        ))
    } else {
        None
    };

    Ok((Arc::new(sender), consumer))
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
