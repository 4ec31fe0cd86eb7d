//! Custom error types for the API service

use auth::error::AuthError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{billing::BillingError, rate_limiter::RateLimitDecision};

pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("An active subscription is required")]
    SubscriptionRequired,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Upstream payment or generation API failure
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Rate limit exceeded")]
    RateLimited(RateLimitDecision),

    #[error("Database error: {0}")]
    Database(#[from] common::error::DatabaseError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::UnknownPlan(plan) => ApiError::Validation(format!("Unknown plan: {}", plan)),
            BillingError::PaymentNotFound => ApiError::NotFound("Payment not found".to_string()),
            BillingError::ProviderNotConfigured(_) | BillingError::MissingWebhookSecret => {
                ApiError::Configuration(err.to_string())
            }
            BillingError::Provider(_) | BillingError::Http(_) => ApiError::Provider(err.to_string()),
            BillingError::InvalidSignature => ApiError::Unauthorized,
            BillingError::InvalidPayload(msg) => ApiError::Validation(msg),
            BillingError::Database(e) => ApiError::Database(e),
        }
    }
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Auth(err) => return err.into_response(),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
            ),
            ApiError::SubscriptionRequired => (
                StatusCode::FORBIDDEN,
                "An active subscription is required".to_string(),
            ),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Provider(msg) => {
                error!("Provider failure: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Payment or generation provider is unavailable, please try again".to_string(),
                )
            }
            ApiError::Configuration(msg) => {
                error!("Configuration error: {}", msg);
                internal()
            }
            ApiError::Database(e) => {
                error!("Database failure: {}", e);
                internal()
            }
            ApiError::Internal(msg) => {
                error!("Internal failure: {}", msg);
                internal()
            }
            ApiError::RateLimited(decision) => {
                let now = Utc::now();
                let body = Json(json!({
                    "error": format!("Rate limit exceeded, {}", decision.wait_message(now)),
                    "retryAfter": decision.retry_after_seconds(now),
                }));
                let headers = [
                    (
                        RATE_LIMIT_REMAINING,
                        HeaderValue::from(decision.remaining_requests),
                    ),
                    (
                        RATE_LIMIT_RESET,
                        HeaderValue::from(decision.reset_at.timestamp()),
                    ),
                ];
                return (StatusCode::TOO_MANY_REQUESTS, headers, body).into_response();
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_rate_limited_response_headers() {
        let reset_at = Utc::now() + Duration::seconds(30);
        let response = ApiError::RateLimited(RateLimitDecision {
            allowed: false,
            remaining_requests: 0,
            remaining_tokens: 120,
            reset_at,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RATE_LIMIT_REMAINING], "0");
        assert_eq!(
            response.headers()[RATE_LIMIT_RESET],
            reset_at.timestamp().to_string().as_str()
        );
    }

    #[test]
    fn test_billing_error_mapping() {
        assert!(matches!(
            ApiError::from(BillingError::InvalidSignature),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from(BillingError::PaymentNotFound),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(BillingError::MissingWebhookSecret),
            ApiError::Configuration(_)
        ));
        assert_eq!(
            ApiError::from(BillingError::UnknownPlan("year".to_string()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }
}
