//! Notification intake and rule listing.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use herald_core::{EnrichedEvent, NotificationRequest};
use herald_rules::RuleEntry;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

/// Acknowledgement for an accepted notification.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AcceptedResponse {
    #[schema(value_type = String)]
    pub status: &'static str,
    /// Broker message id, usable for tracing the delivery.
    #[schema(value_type = String)]
    pub message_id: Uuid,
    /// The request after enrichment, exactly as published.
    #[schema(value_type = Object)]
    pub event: EnrichedEvent,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RulesResponse {
    pub count: usize,
    #[schema(value_type = Vec<Object>)]
    pub rules: Vec<RuleEntry>,
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications",
    tag = "Notifications",
    request_body(content = Object, description = "event_type, actor_role, recipients, subject, body, and optional channels / recipient_roles / metadata"),
    responses(
        (status = 202, description = "Enriched and handed to the broker", body = AcceptedResponse),
        (status = 400, description = "Body is not valid JSON for a notification request", body = ErrorBody),
        (status = 422, description = "Request failed validation", body = ErrorBody),
        (status = 500, description = "Broker did not accept the message", body = ErrorBody)
    )
)]
pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NotificationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let Json(request) = payload?;
    let event = state.resolver.resolve(request)?;
    let receipt = state.publisher.publish(&event).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted",
            message_id: receipt.message_id,
            event,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/rules",
    tag = "Notifications",
    responses(
        (status = 200, description = "Default channels and recipient roles per (event_type, actor_role)", body = RulesResponse)
    )
)]
pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<RulesResponse> {
    let rules = state.resolver.table().entries().to_vec();
    Json(RulesResponse {
        count: rules.len(),
        rules,
    })
}
