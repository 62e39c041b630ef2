//! HTTP router construction.
//!
//! Assembles routes, middleware and OpenAPI docs into a single `Router`.

use std::sync::Arc;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);

    Router::new()
        .route("/health", get(api::health))
        .route("/api/v1/notifications", post(api::create_notification))
        .route("/api/v1/notifications/rules", get(api::list_rules))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}

/// `*` allows any origin; anything else is a single allowed origin.
fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([CONTENT_TYPE]),
        Err(e) => {
            tracing::warn!(origin, error = %e, "invalid CORS_ORIGIN, cross-origin requests disabled");
            CorsLayer::new()
        }
    }
}
