use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tracing::debug;

use crate::{limiter::Decision, matcher::RequestDescriptor, service::RateLimitService};

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Build the engine's view of an axum request.
///
/// The client address comes from `ConnectInfo`; without it the request is
/// counted under the shared unknown-client key.
pub fn request_descriptor(request: &Request) -> RequestDescriptor {
    let client_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    RequestDescriptor {
        client_address,
        path: Some(request.uri().path().to_string()),
        method: request.method().as_str().to_string(),
    }
}

/// Axum middleware that admits or rejects each request.
///
/// Install with `axum::middleware::from_fn_with_state(service, rate_limit_middleware)`.
pub async fn rate_limit_middleware(
    State(service): State<Arc<RateLimitService>>,
    request: Request,
    next: Next,
) -> Response {
    let descriptor = request_descriptor(&request);

    match service.process(&descriptor).await {
        Ok(Decision::Bypass) => next.run(request).await,
        Ok(decision @ Decision::Admitted { .. }) => {
            let mut response = next.run(request).await;
            add_rate_limit_headers(response.headers_mut(), &decision);
            response
        }
        Ok(decision) => {
            debug!("Rejecting {} {}", descriptor.method, request.uri().path());
            rate_limited_response(&decision)
        }
        Err(e) => {
            let status = if e.is_store_unavailable() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            let body = json!({
                "error": "Rate limit check failed",
                "status": status.as_u16(),
            });
            (status, Json(body)).into_response()
        }
    }
}

/// Write limit, remaining and (for rejections) retry headers
pub fn add_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    if let Some(limit) = decision.limit() {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    }
    if let Some(remaining) = decision.remaining() {
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    }
    if let Some(retry_after) = decision.retry_after_secs() {
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    }
}

/// 429 Too Many Requests response with rate limit headers and a JSON body
pub fn rate_limited_response(decision: &Decision) -> Response {
    let message = match decision {
        Decision::Rejected { message, .. } => message.as_str(),
        _ => "Rate limit exceeded",
    };

    let body = json!({
        "error": message,
        "status": StatusCode::TOO_MANY_REQUESTS.as_u16(),
        "limit": decision.limit(),
        "remaining": 0,
        "retry_after": decision.retry_after_secs(),
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    add_rate_limit_headers(response.headers_mut(), decision);
    response
}
