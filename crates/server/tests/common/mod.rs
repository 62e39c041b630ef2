//! Shared helpers for HTTP integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;

use herald_bus::{
    memory_queue, Binding, MemoryQueueReceiver, NotificationPublisher, PublisherSettings,
    QueueSender,
};
use herald_core::Config;
use herald_rules::EnrichmentResolver;
use herald_server::{build_router, AppState};

pub fn test_config() -> Config {
    Config::default()
}

/// Build the full router over an in-memory queue; the receiver is returned
/// so tests can inspect what was published.
pub fn build_test_app() -> (Router, MemoryQueueReceiver) {
    let config = test_config();
    let (tx, rx) = memory_queue(64);
    let tx = tx.with_binding(Binding::new(
        &config.broker.exchange,
        &config.broker.routing_key,
    ));
    (build_app_with_sender(config, Arc::new(tx)), rx)
}

pub fn build_app_with_sender(config: Config, sender: Arc<dyn QueueSender>) -> Router {
    let mut settings = PublisherSettings::from_config(&config);
    settings.timeout = Duration::from_millis(200);

    let state = AppState {
        config: Arc::new(config),
        resolver: EnrichmentResolver::default(),
        publisher: NotificationPublisher::new(sender, settings),
        consumer_stats: None,
    };
    build_router(Arc::new(state))
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    post_raw(uri, body.to_string())
}

pub fn post_raw(uri: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
