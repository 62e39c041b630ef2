use std::sync::Arc;

use herald_bus::NotificationPublisher;
use herald_core::Config;
use herald_notify::ConsumerStats;
use herald_rules::EnrichmentResolver;

/// Shared, read-only application state.
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: EnrichmentResolver,
    pub publisher: NotificationPublisher,
    /// Present when a consumer runs inside this process.
    pub consumer_stats: Option<Arc<ConsumerStats>>,
}
