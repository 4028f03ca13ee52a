//! HTTP error responses

use axum::{
    extract::rejection::JsonRejection,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde_json::json;

use crate::core::RateLimitDecision;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Too many requests, please try again later")]
    RateLimited(RateLimitDecision),

    #[error("{0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();

        match self {
            ApiError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message, "success": false })),
            )
                .into_response(),
            ApiError::RateLimited(decision) => {
                let retry_after = decision.retry_after_secs(Utc::now());
                let body = json!({
                    "error": message,
                    "success": false,
                    "rateLimit": {
                        "limit": decision.limit,
                        "remaining": decision.remaining,
                        "resetTime": decision.reset_at.to_rfc3339(),
                        "retryAfter": retry_after,
                    }
                });

                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_after.to_string())],
                    Json(body),
                )
                    .into_response()
            }
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message, "success": false })),
            )
                .into_response(),
        }
    }
}
