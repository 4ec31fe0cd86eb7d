//! Ad copy generation and query history

use auth::middleware::CurrentSession;
use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::IntoResponse,
};
use std::net::SocketAddr;
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    generation::{build_prompt, estimated_cost},
    middleware::{client_identifier, enforce_rate_limit, rate_limit_headers},
    models::{GenerateRequest, GenerateResponse, NewQuery},
    state::AppState,
};

/// How many past generations the history endpoint returns
pub const HISTORY_LIMIT: i64 = 50;

/// Generate ad copy for a subscriber
pub async fn generate(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    remote: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<GenerateRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_id = session.user.id;
    let prompt = build_prompt(&payload)?;

    if state.billing.active_subscription(user_id).await?.is_none() {
        return Err(ApiError::SubscriptionRequired);
    }

    let generator = state.generator.as_ref().ok_or_else(|| {
        ApiError::Configuration("OPENAI_API_KEY is not set".to_string())
    })?;

    let identifier = client_identifier(Some(user_id), &headers, remote.map(|c| c.0));
    let decision = enforce_rate_limit(&state, &identifier, estimated_cost(&prompt)).await?;

    let copy = generator.generate(&prompt).await?;
    let tokens_used = i32::try_from(copy.tokens_used).unwrap_or(i32::MAX);

    let record = state
        .queries
        .create(&NewQuery {
            user_id,
            prompt: serde_json::to_value(&payload)
                .map_err(|e| ApiError::Internal(e.to_string()))?,
            result: copy.text,
            tokens_used,
        })
        .await?;

    info!("Stored generation {} for user {}", record.id, user_id);
    Ok((
        rate_limit_headers(&decision),
        Json(GenerateResponse {
            id: record.id,
            result: record.result,
            tokens_used: record.tokens_used,
        }),
    ))
}

/// The caller's most recent generations
pub async fn history(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> ApiResult<impl IntoResponse> {
    let queries = state
        .queries
        .recent_for_user(session.user.id, HISTORY_LIMIT)
        .await?;
    Ok(Json(queries))
}
