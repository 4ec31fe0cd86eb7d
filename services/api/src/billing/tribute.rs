//! Tribute payment client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{
    BillingError, BillingResult,
    provider::{
        CheckoutRequest, CheckoutSession, PaymentProvider, ProviderPaymentStatus, ensure_success,
    },
};
use crate::models::{ProviderKind, plan::format_amount};

pub const DEFAULT_TRIBUTE_API_URL: &str = "https://tribute.tg/api/v1";

#[derive(Debug, Clone)]
pub struct TributeConfig {
    pub api_url: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    order_id: serde_json::Value,
    payment_url: Option<String>,
    url: Option<String>,
    status: Option<String>,
}

impl OrderResponse {
    fn external_id(&self) -> Option<String> {
        id_to_string(&self.id).or_else(|| id_to_string(&self.order_id))
    }

    fn confirmation_url(self) -> Option<String> {
        self.payment_url.or(self.url)
    }
}

/// Map a Tribute order status onto the processor-neutral status
pub fn map_order_status(status: &str) -> ProviderPaymentStatus {
    match status.to_ascii_lowercase().as_str() {
        "paid" | "success" | "succeeded" | "completed" => ProviderPaymentStatus::Succeeded,
        "cancelled" | "canceled" | "failed" | "expired" | "rejected" => {
            ProviderPaymentStatus::Canceled
        }
        _ => ProviderPaymentStatus::Pending,
    }
}

/// Tribute accepts numeric or string order ids
fn id_to_string(id: &serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct TributeClient {
    client: Client,
    config: TributeConfig,
}

impl TributeClient {
    pub fn new(config: TributeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PaymentProvider for TributeClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tribute
    }

    async fn create_payment(&self, request: &CheckoutRequest) -> BillingResult<CheckoutSession> {
        let body = json!({
            "orderNumber": request.order_id,
            "amount": format_amount(request.amount),
            "currency": request.currency,
            "description": request.description,
            "successUrl": request.return_url,
            "metadata": {
                "paymentId": request.payment_id,
                "method": request.method,
            },
        });

        let response = self
            .client
            .post(self.url("/orders"))
            .header("Api-Key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let order: OrderResponse = ensure_success(response, self.kind()).await?.json().await?;

        let external_id = order
            .external_id()
            .ok_or_else(|| BillingError::Provider("Tribute order has no id".to_string()))?;
        info!(
            "Tribute order {} created for payment {} (status {:?})",
            external_id, request.payment_id, order.status
        );

        Ok(CheckoutSession {
            external_id,
            confirmation_url: order.confirmation_url(),
        })
    }

    async fn fetch_status(&self, external_id: &str) -> BillingResult<ProviderPaymentStatus> {
        let response = self
            .client
            .get(self.url(&format!("/orders/{}", external_id)))
            .header("Api-Key", &self.config.api_key)
            .send()
            .await?;
        let order: OrderResponse = ensure_success(response, self.kind()).await?.json().await?;

        Ok(order
            .status
            .as_deref()
            .map(map_order_status)
            .unwrap_or(ProviderPaymentStatus::Pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentMethod;
    use mockito::Matcher;
    use uuid::Uuid;

    fn client(server: &mockito::Server) -> TributeClient {
        TributeClient::new(TributeConfig {
            api_url: server.url(),
            api_key: "tribute-key".to_string(),
        })
    }

    #[tokio::test]
    async fn test_create_payment_sends_order_number() {
        let mut server = mockito::Server::new_async().await;
        let payment_id = Uuid::new_v4();
        let order_id = format!("adlab_{}_1700000000", payment_id);

        let mock = server
            .mock("POST", "/orders")
            .match_header("api-key", "tribute-key")
            .match_body(Matcher::PartialJson(json!({
                "orderNumber": order_id,
                "amount": "2990.00",
                "currency": "RUB",
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 4411, "paymentUrl": "https://pay.example/4411", "status": "new"}"#)
            .create_async()
            .await;

        let session = client(&server)
            .create_payment(&CheckoutRequest {
                payment_id,
                order_id,
                amount: 299_000,
                currency: "RUB".to_string(),
                description: "Ad Lab month".to_string(),
                method: PaymentMethod::Tribute,
                return_url: "http://localhost/billing".to_string(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(session.external_id, "4411");
        assert_eq!(
            session.confirmation_url.as_deref(),
            Some("https://pay.example/4411")
        );
    }

    #[tokio::test]
    async fn test_fetch_status_maps_paid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/orders/4411")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "4411", "status": "paid"}"#)
            .create_async()
            .await;

        let status = client(&server).fetch_status("4411").await.unwrap();
        assert_eq!(status, ProviderPaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_error_status_is_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/orders/missing")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let err = client(&server).fetch_status("missing").await.unwrap_err();
        assert!(matches!(err, BillingError::Provider(_)));
    }

    #[test]
    fn test_map_order_status() {
        assert_eq!(map_order_status("PAID"), ProviderPaymentStatus::Succeeded);
        assert_eq!(map_order_status("expired"), ProviderPaymentStatus::Canceled);
        assert_eq!(map_order_status("new"), ProviderPaymentStatus::Pending);
    }

    #[test]
    fn test_order_response_with_both_id_keys() {
        let order: OrderResponse = serde_json::from_str(
            r#"{"id": 4411, "orderId": "adlab_x_1", "url": "https://pay.example/u", "status": "new"}"#,
        )
        .unwrap();
        assert_eq!(order.external_id().as_deref(), Some("4411"));
        assert_eq!(
            order.confirmation_url().as_deref(),
            Some("https://pay.example/u")
        );

        let order: OrderResponse = serde_json::from_str(r#"{"orderId": 77}"#).unwrap();
        assert_eq!(order.external_id().as_deref(), Some("77"));
    }
}
