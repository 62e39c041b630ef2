//! OpenAPI documentation aggregator.
//!
//! Collects the `#[utoipa::path]`-annotated handlers and `ToSchema` types into
//! one OpenAPI document, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "herald API",
        version = "0.1.0",
        description = "Notification relay: enriches events against the rule table and publishes them for per-channel delivery.",
    ),
    tags(
        (name = "Health", description = "Service liveness and consumer counters"),
        (name = "Notifications", description = "Notification intake and rule table"),
    ),
    paths(
        crate::api::health::health,
        crate::api::notifications::create_notification,
        crate::api::notifications::list_rules,
    ),
    components(schemas(
        crate::api::health::HealthResponse,
        crate::api::notifications::AcceptedResponse,
        crate::api::notifications::RulesResponse,
        crate::error::ErrorBody,
    ))
)]
pub struct ApiDoc;
