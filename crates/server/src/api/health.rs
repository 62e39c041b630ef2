//! Liveness and consumer counters.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use herald_notify::ConsumerStatsSnapshot;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    #[schema(value_type = String)]
    pub status: &'static str,
    pub service: String,
    pub version: String,
    pub exchange: String,
    pub queue: String,
    pub in_memory_broker: bool,
    /// Counters of the embedded consumer, when one runs in this process.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub consumer: Option<ConsumerStatsSnapshot>,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = &state.config;
    Json(HealthResponse {
        status: "ok",
        service: config.service.name.clone(),
        version: config.service.version.clone(),
        exchange: config.broker.exchange.clone(),
        queue: config.broker.queue.clone(),
        in_memory_broker: config.broker.is_in_memory(),
        consumer: state.consumer_stats.as_ref().map(|s| s.snapshot()),
    })
}
