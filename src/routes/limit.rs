//! Rate limiting middleware for the memory endpoints

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use super::error::ApiError;
use crate::core::RateLimitDecision;
use crate::AppState;

pub const SESSION_HEADER: &str = "x-session-id";

/// Reject the request with 429 when its caller is over budget
pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let identity = caller_identity(&request);
    let decision = state.limiter.check(&identity);

    if !decision.allowed {
        tracing::debug!(
            path = %request.uri().path(),
            reset_at = %decision.reset_at,
            "Rate limit exceeded"
        );
        return ApiError::RateLimited(decision).into_response();
    }

    let mut response = next.run(request).await;
    set_rate_limit_headers(response.headers_mut(), &decision);
    response
}

/// Explicit session id when present, otherwise the peer IP address.
///
/// Both are weak: a client can rotate session ids freely, and callers behind
/// one NAT or proxy share an address.
fn caller_identity(request: &Request) -> String {
    if let Some(session) = request
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return format!("session:{}", session);
    }

    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("addr:{}", addr.ip()),
        None => "unknown".to_string(),
    }
}

fn set_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.reset_at.timestamp()),
    );
}
