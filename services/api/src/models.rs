//! API models for request and response payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod payment;
pub mod plan;
pub mod query;
pub mod subscription;

pub use payment::{NewPayment, Payment, PaymentMethod, PaymentStatus, ProviderKind};
pub use query::{NewQuery, QueryRecord};
pub use subscription::{Subscription, SubscriptionStatus};

/// Request for starting a checkout
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub plan_id: String,
    pub method: PaymentMethod,
}

/// Response for a started checkout
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub payment_id: Uuid,
    pub order_id: String,
    pub status: PaymentStatus,
    /// Where the client should be sent to pay
    pub confirmation_url: Option<String>,
}

/// Query parameters for the status poll; exactly one is expected
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusQuery {
    pub payment_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub order_id: Option<String>,
}

/// Response for the status poll
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Payment> for PaymentStatusResponse {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            status: payment.status,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
            completed_at: payment.completed_at,
        }
    }
}

/// Response for the subscription lookup
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub active: bool,
    pub subscription: Option<Subscription>,
}

/// Request for ad copy generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub product: String,
    pub audience: Option<String>,
    pub tone: Option<String>,
    pub platform: Option<String>,
}

/// Response for ad copy generation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub id: Uuid,
    pub result: String,
    pub tokens_used: i32,
}
