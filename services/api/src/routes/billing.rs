//! Plans, payments, subscriptions and processor webhooks

use auth::middleware::CurrentSession;
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::json;
use tracing::{error, warn};

use crate::{
    billing::BillingError,
    error::{ApiError, ApiResult},
    models::{
        CreatePaymentRequest, PaymentStatusQuery, PaymentStatusResponse, SubscriptionResponse,
    },
    repositories::PaymentLookup,
    state::AppState,
};

/// Start a checkout for a plan
pub async fn create_payment(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<CreatePaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = state
        .billing
        .checkout(session.user.id, &payload.plan_id, payload.method)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// The caller's payment history
pub async fn list_payments(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.billing.payment_history(session.user.id).await?))
}

/// Poll a payment by internal, processor or order id
pub async fn payment_status(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Query(query): Query<PaymentStatusQuery>,
) -> ApiResult<impl IntoResponse> {
    let lookup = match query {
        PaymentStatusQuery {
            payment_id: Some(id),
            ..
        } => PaymentLookup::Id(id),
        PaymentStatusQuery {
            external_id: Some(external_id),
            ..
        } => PaymentLookup::ExternalId(external_id),
        PaymentStatusQuery {
            order_id: Some(order_id),
            ..
        } => PaymentLookup::OrderId(order_id),
        _ => {
            return Err(ApiError::Validation(
                "paymentId, externalId or orderId is required".to_string(),
            ));
        }
    };

    let payment = state
        .billing
        .payment_status(session.user.id, &lookup)
        .await?;
    Ok(Json(PaymentStatusResponse::from(&payment)))
}

/// The caller's current subscription, if it grants access
pub async fn get_subscription(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> ApiResult<impl IntoResponse> {
    let subscription = state.billing.active_subscription(session.user.id).await?;
    Ok(Json(SubscriptionResponse {
        active: subscription.is_some(),
        subscription,
    }))
}

/// Cancel the caller's active subscriptions
pub async fn cancel_subscription(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> ApiResult<impl IntoResponse> {
    if !state.billing.cancel_subscription(session.user.id).await? {
        return Err(ApiError::NotFound(
            "No active subscription to cancel".to_string(),
        ));
    }
    Ok(Json(json!({ "success": true })))
}

/// Failures while processing a verified webhook are reported as 500 so the
/// processor re-delivers
fn webhook_failure(err: BillingError) -> ApiError {
    match err {
        BillingError::InvalidSignature | BillingError::MissingWebhookSecret => err.into(),
        other => {
            error!("Webhook processing failed: {}", other);
            ApiError::Internal("Webhook processing failed".to_string())
        }
    }
}

/// Tribute (and generic signed) webhook
pub async fn tribute_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    state
        .billing
        .verify_webhook(&headers, &body)
        .map_err(webhook_failure)?;

    let payload = crate::billing::webhook::parse_body(&headers, &body).map_err(webhook_failure)?;
    let outcome = state
        .billing
        .process_webhook(&payload)
        .await
        .map_err(webhook_failure)?;

    tracing::info!("Tribute webhook processed: {:?}", outcome);
    Ok(Json(json!({ "success": true })))
}

/// YooKassa notification; the payment state is confirmed against the API
pub async fn yookassa_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let payload = crate::billing::webhook::parse_body(&headers, &body).map_err(webhook_failure)?;
    let outcome = state
        .billing
        .process_yookassa_notification(&payload)
        .await
        .map_err(|e| {
            warn!("YooKassa notification not applied: {}", e);
            webhook_failure(e)
        })?;

    tracing::info!("YooKassa notification processed: {:?}", outcome);
    Ok(Json(json!({ "success": true })))
}
