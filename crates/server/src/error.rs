//! Error-to-HTTP mapping.
//!
//! Every failure leaves the API as JSON `{"error": .., "kind": ..}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use herald_bus::PublishError;
use herald_core::ValidationError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Body is not the expected JSON shape.
    #[error("{0}")]
    MalformedRequest(String),

    #[error("failed to publish notification: {0}")]
    Publish(#[from] PublishError),
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.kind(),
            Self::MalformedRequest(_) => "MalformedRequest",
            Self::Publish(_) => "PublishError",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::MalformedRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::info!(kind = self.kind(), error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
