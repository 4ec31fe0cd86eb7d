//! Rate limiting middleware and helpers

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Method, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET},
    rate_limiter::RateLimitDecision,
    state::AppState,
};

/// Key requests are counted under: the user id when signed in, otherwise
/// the client address combined with its user agent
pub fn client_identifier(
    user_id: Option<Uuid>,
    headers: &HeaderMap,
    remote: Option<SocketAddr>,
) -> String {
    if let Some(user_id) = user_id {
        return format!("user:{}", user_id);
    }

    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    format!("ip:{}:{}", ip, user_agent)
}

/// Charge `cost` tokens to `identifier`, failing with a 429 when over quota
pub async fn enforce_rate_limit(
    state: &AppState,
    identifier: &str,
    cost: u64,
) -> ApiResult<RateLimitDecision> {
    let decision = state.rate_limiter.check_limit(identifier, cost).await;
    if decision.allowed {
        Ok(decision)
    } else {
        Err(ApiError::RateLimited(decision))
    }
}

/// Rate limit headers attached to successful responses
pub fn rate_limit_headers(decision: &RateLimitDecision) -> [(&'static str, HeaderValue); 2] {
    [
        (
            RATE_LIMIT_REMAINING,
            HeaderValue::from(decision.remaining_requests),
        ),
        (
            RATE_LIMIT_RESET,
            HeaderValue::from(decision.reset_at.timestamp()),
        ),
    ]
}

/// Count POST requests to the authentication endpoints per client
pub async fn limit_credential_attempts(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() != Method::POST {
        return next.run(req).await;
    }

    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let identifier = client_identifier(None, req.headers(), remote);

    match enforce_rate_limit(&state, &identifier, 0).await {
        Ok(_) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_prefers_user() {
        let user = Uuid::new_v4();
        let id = client_identifier(Some(user), &HeaderMap::new(), None);
        assert_eq!(id, format!("user:{}", user));
    }

    #[test]
    fn test_identifier_falls_back_to_ip_and_agent() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert(header::USER_AGENT, "curl/8".parse().unwrap());
        assert_eq!(
            client_identifier(None, &headers, None),
            "ip:203.0.113.7:curl/8"
        );

        let remote: SocketAddr = "198.51.100.2:5555".parse().unwrap();
        assert_eq!(
            client_identifier(None, &HeaderMap::new(), Some(remote)),
            "ip:198.51.100.2:unknown"
        );
    }
}
