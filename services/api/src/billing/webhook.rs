//! Webhook signature verification and payload interpretation

use axum::http::{HeaderMap, header};
use hmac::{Hmac, Mac};
use regex::Regex;
use sha2::Sha256;
use std::sync::OnceLock;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Headers a signature may arrive in, in lookup order
pub const SIGNATURE_HEADERS: [&str; 3] = ["x-tribute-signature", "x-signature", "signature"];

/// Signature supplied with a webhook delivery, if any
pub fn signature_from_headers(headers: &HeaderMap) -> Option<&str> {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Hex-encoded HMAC-SHA256 of the raw body
pub fn sign(secret: &str, body: &[u8]) -> BillingResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::InvalidPayload("HMAC key rejected".to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Compare a supplied signature against the expected one in constant time.
/// An optional `sha256=` prefix is accepted.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let supplied = signature.trim();
    let supplied = supplied.strip_prefix("sha256=").unwrap_or(supplied);

    match sign(secret, body) {
        Ok(expected) => expected
            .as_bytes()
            .ct_eq(supplied.to_ascii_lowercase().as_bytes())
            .into(),
        Err(_) => false,
    }
}

/// Parse a JSON or form-encoded webhook body into a JSON object
pub fn parse_body(headers: &HeaderMap, body: &[u8]) -> BillingResult<serde_json::Value> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let map: serde_json::Map<String, serde_json::Value> = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), serde_json::Value::String(v.into_owned())))
            .collect();
        return Ok(serde_json::Value::Object(map));
    }

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;
    if !value.is_object() {
        return Err(BillingError::InvalidPayload(
            "expected a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// What a webhook asks us to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Succeeded,
    Failed,
    Expired,
    SubscriptionCreated,
    SubscriptionCancelled,
    Ignored(String),
}

/// Look a field up at the top level, then inside `data` or `payload`
fn field<'a>(payload: &'a serde_json::Value, names: &[&str]) -> Option<&'a serde_json::Value> {
    let scopes = [
        Some(payload),
        payload.get("data"),
        payload.get("payload"),
    ];
    scopes.into_iter().flatten().find_map(|scope| {
        names
            .iter()
            .find_map(|name| scope.get(*name))
            .filter(|v| !v.is_null())
    })
}

fn string_field(payload: &serde_json::Value, names: &[&str]) -> Option<String> {
    match field(payload, names)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Dispatch on the event name, falling back to a bare status field
pub fn classify(payload: &serde_json::Value) -> WebhookEvent {
    let event = string_field(payload, &["event", "type", "name"])
        .or_else(|| string_field(payload, &["status"]))
        .unwrap_or_default()
        .to_ascii_lowercase();

    match event.as_str() {
        "payment.completed" | "payment.succeeded" | "payment.success" | "order.paid"
        | "completed" | "succeeded" | "success" | "paid" => WebhookEvent::Succeeded,
        "payment.failed" | "order.failed" | "failed" => WebhookEvent::Failed,
        "payment.expired" | "order.expired" | "payment.canceled" | "payment.cancelled"
        | "expired" | "canceled" | "cancelled" => WebhookEvent::Expired,
        "subscription.created" => WebhookEvent::SubscriptionCreated,
        "subscription.cancelled" | "subscription.canceled" => WebhookEvent::SubscriptionCancelled,
        other => WebhookEvent::Ignored(other.to_string()),
    }
}

fn order_number_regex() -> &'static Regex {
    static ORDER_NUMBER: OnceLock<Regex> = OnceLock::new();
    ORDER_NUMBER.get_or_init(|| {
        Regex::new(r"^adlab_([0-9a-fA-F-]{36})_\d+$").expect("Failed to compile order number regex")
    })
}

/// Recover the local payment id from an `adlab_<uuid>_<ts>` order number
pub fn payment_id_from_order(order_id: &str) -> Option<Uuid> {
    order_number_regex()
        .captures(order_id.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| Uuid::parse_str(m.as_str()).ok())
}

/// Identifiers a webhook can carry for the payment it concerns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookTarget {
    pub payment_id: Option<Uuid>,
    pub order_id: Option<String>,
    pub external_id: Option<String>,
}

pub fn extract_target(payload: &serde_json::Value) -> WebhookTarget {
    let order_id = string_field(payload, &["orderId", "order_id", "orderNumber", "order_number"]);
    let payment_id = string_field(payload, &["paymentId", "payment_id"])
        .and_then(|id| Uuid::parse_str(&id).ok())
        .or_else(|| order_id.as_deref().and_then(payment_id_from_order))
        .or_else(|| {
            field(payload, &["metadata"])
                .and_then(|m| m.get("paymentId"))
                .and_then(|v| v.as_str())
                .and_then(|id| Uuid::parse_str(id).ok())
        });
    let external_id = string_field(payload, &["id", "externalId", "external_id"]);

    WebhookTarget {
        payment_id,
        order_id,
        external_id,
    }
}

/// Amount and currency reported by the processor, kept on the payment's metadata
pub fn paid_metadata(payload: &serde_json::Value) -> serde_json::Value {
    let mut metadata = serde_json::Map::new();
    if let Some(amount) = string_field(payload, &["amount"]) {
        metadata.insert("paidAmount".to_string(), amount.into());
    }
    if let Some(currency) = string_field(payload, &["currency"]) {
        metadata.insert("paidCurrency".to_string(), currency.into());
    }
    metadata.insert(
        "paidAt".to_string(),
        chrono::Utc::now().to_rfc3339().into(),
    );
    serde_json::Value::Object(metadata)
}
