//! YooKassa payment client (cards and SBP)

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{
    BillingResult,
    provider::{
        CheckoutRequest, CheckoutSession, PaymentProvider, ProviderPaymentStatus, ensure_success,
    },
};
use crate::models::{PaymentMethod, ProviderKind, plan::format_amount};

pub const DEFAULT_YOOKASSA_API_URL: &str = "https://api.yookassa.ru/v3";

#[derive(Debug, Clone)]
pub struct YooKassaConfig {
    pub api_url: String,
    pub shop_id: String,
    pub secret_key: String,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
    confirmation_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    status: String,
    confirmation: Option<Confirmation>,
}

/// YooKassa payment statuses: pending, waiting_for_capture, succeeded, canceled
pub fn map_payment_status(status: &str) -> ProviderPaymentStatus {
    match status {
        "succeeded" => ProviderPaymentStatus::Succeeded,
        "canceled" => ProviderPaymentStatus::Canceled,
        _ => ProviderPaymentStatus::Pending,
    }
}

#[derive(Clone)]
pub struct YooKassaClient {
    client: Client,
    config: YooKassaConfig,
}

impl YooKassaClient {
    pub fn new(config: YooKassaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn payment_body(request: &CheckoutRequest) -> serde_json::Value {
        let mut body = json!({
            "amount": {
                "value": format_amount(request.amount),
                "currency": request.currency,
            },
            "capture": true,
            "confirmation": {
                "type": "redirect",
                "return_url": request.return_url,
            },
            "description": request.description,
            "metadata": {
                "paymentId": request.payment_id,
                "orderId": request.order_id,
            },
        });

        if request.method == PaymentMethod::Sbp {
            body["payment_method_data"] = json!({ "type": "sbp" });
        }

        body
    }
}

#[async_trait]
impl PaymentProvider for YooKassaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::YooKassa
    }

    async fn create_payment(&self, request: &CheckoutRequest) -> BillingResult<CheckoutSession> {
        let response = self
            .client
            .post(self.url("/payments"))
            .basic_auth(&self.config.shop_id, Some(&self.config.secret_key))
            // Retries of the same local payment must not open a second charge
            .header("Idempotence-Key", request.payment_id.to_string())
            .json(&Self::payment_body(request))
            .send()
            .await?;
        let payment: PaymentResponse = ensure_success(response, self.kind()).await?.json().await?;

        info!(
            "YooKassa payment {} created for payment {} (status {})",
            payment.id, request.payment_id, payment.status
        );

        Ok(CheckoutSession {
            external_id: payment.id,
            confirmation_url: payment.confirmation.and_then(|c| c.confirmation_url),
        })
    }

    async fn fetch_status(&self, external_id: &str) -> BillingResult<ProviderPaymentStatus> {
        let response = self
            .client
            .get(self.url(&format!("/payments/{}", external_id)))
            .basic_auth(&self.config.shop_id, Some(&self.config.secret_key))
            .send()
            .await?;
        let payment: PaymentResponse = ensure_success(response, self.kind()).await?.json().await?;

        Ok(map_payment_status(&payment.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use uuid::Uuid;

    fn request(method: PaymentMethod) -> CheckoutRequest {
        let payment_id = Uuid::new_v4();
        CheckoutRequest {
            payment_id,
            order_id: format!("adlab_{}_1700000000", payment_id),
            amount: 99_000,
            currency: "RUB".to_string(),
            description: "Ad Lab week".to_string(),
            method,
            return_url: "http://localhost/billing".to_string(),
        }
    }

    #[test]
    fn test_sbp_sets_payment_method_data() {
        let body = YooKassaClient::payment_body(&request(PaymentMethod::Sbp));
        assert_eq!(body["payment_method_data"]["type"], "sbp");
        assert_eq!(body["amount"]["value"], "990.00");

        let body = YooKassaClient::payment_body(&request(PaymentMethod::Card));
        assert!(body.get("payment_method_data").is_none());
    }

    #[tokio::test]
    async fn test_create_payment_uses_idempotence_key() {
        let mut server = mockito::Server::new_async().await;
        let request = request(PaymentMethod::Card);

        let mock = server
            .mock("POST", "/payments")
            .match_header("idempotence-key", request.payment_id.to_string().as_str())
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "id": "2d1f4a52-000f-5000-9000-1b0b1c4f2d11",
                    "status": "pending",
                    "confirmation": {"type": "redirect", "confirmation_url": "https://yoomoney.ru/checkout/x"}
                }"#,
            )
            .create_async()
            .await;

        let client = YooKassaClient::new(YooKassaConfig {
            api_url: server.url(),
            shop_id: "123456".to_string(),
            secret_key: "test_secret".to_string(),
        });
        let session = client.create_payment(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(session.external_id, "2d1f4a52-000f-5000-9000-1b0b1c4f2d11");
        assert_eq!(
            session.confirmation_url.as_deref(),
            Some("https://yoomoney.ru/checkout/x")
        );
    }

    #[test]
    fn test_map_payment_status() {
        assert_eq!(map_payment_status("succeeded"), ProviderPaymentStatus::Succeeded);
        assert_eq!(map_payment_status("canceled"), ProviderPaymentStatus::Canceled);
        assert_eq!(
            map_payment_status("waiting_for_capture"),
            ProviderPaymentStatus::Pending
        );
    }
}
