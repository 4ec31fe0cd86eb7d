//! Payment provider abstraction

use async_trait::async_trait;
use uuid::Uuid;

use super::BillingResult;
use crate::models::{PaymentMethod, ProviderKind};

/// Everything a processor needs to open a remote payment
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub payment_id: Uuid,
    pub order_id: String,
    /// Minor units (kopecks)
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub method: PaymentMethod,
    pub return_url: String,
}

/// Remote payment opened by a processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub external_id: String,
    pub confirmation_url: Option<String>,
}

/// Processor-side state of a payment as reported by its status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPaymentStatus {
    Pending,
    Succeeded,
    Canceled,
}

/// Payment provider trait
///
/// Abstracts payment processing so Tribute and YooKassa can be driven the same way
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Open a remote payment for a local pending one
    async fn create_payment(&self, request: &CheckoutRequest) -> BillingResult<CheckoutSession>;

    /// Current processor-side status of a remote payment
    async fn fetch_status(&self, external_id: &str) -> BillingResult<ProviderPaymentStatus>;
}

/// Turn a non-2xx processor response into a provider error, logging the body
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    provider: ProviderKind,
) -> BillingResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!("{} API returned error status {}: {}", provider, status, body);
    Err(super::BillingError::Provider(format!(
        "{} API error: {}",
        provider, status
    )))
}
