//! Billing service: drives payments from checkout to a terminal state

use axum::http::HeaderMap;
use chrono::Utc;
use common::environment::RuntimeEnvironment;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    BillingError, BillingResult,
    provider::{CheckoutRequest, PaymentProvider, ProviderPaymentStatus},
    webhook::{self, WebhookEvent},
};
use crate::{
    models::{
        CreatePaymentResponse, NewPayment, Payment, PaymentMethod, PaymentStatus, ProviderKind,
        Subscription,
        payment::order_number,
        plan::{find_plan, parse_amount},
    },
    repositories::{BillingRepository, CompletionOutcome, PaymentLookup},
};

/// How many payments the history endpoint returns
pub const PAYMENT_HISTORY_LIMIT: i64 = 50;

/// What a processed webhook did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied(PaymentStatus),
    /// The payment was already terminal; nothing changed
    Unchanged,
    SubscriptionCancelled,
    Ignored,
}

#[derive(Clone)]
pub struct BillingService {
    repository: Arc<dyn BillingRepository>,
    tribute: Option<Arc<dyn PaymentProvider>>,
    yookassa: Option<Arc<dyn PaymentProvider>>,
    webhook_secret: Option<String>,
    environment: RuntimeEnvironment,
    return_url: String,
}

impl BillingService {
    pub fn new(
        repository: Arc<dyn BillingRepository>,
        environment: RuntimeEnvironment,
        return_url: String,
    ) -> Self {
        Self {
            repository,
            tribute: None,
            yookassa: None,
            webhook_secret: None,
            environment,
            return_url,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        match provider.kind() {
            ProviderKind::Tribute => self.tribute = Some(provider),
            ProviderKind::YooKassa => self.yookassa = Some(provider),
        }
        self
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn repository(&self) -> &Arc<dyn BillingRepository> {
        &self.repository
    }

    fn provider(&self, kind: ProviderKind) -> BillingResult<&Arc<dyn PaymentProvider>> {
        let provider = match kind {
            ProviderKind::Tribute => self.tribute.as_ref(),
            ProviderKind::YooKassa => self.yookassa.as_ref(),
        };
        provider.ok_or(BillingError::ProviderNotConfigured(match kind {
            ProviderKind::Tribute => "Tribute",
            ProviderKind::YooKassa => "YooKassa",
        }))
    }

    /// Create a pending payment for a plan and open it with the processor.
    ///
    /// A processor failure marks the payment failed before the error is returned.
    pub async fn checkout(
        &self,
        user_id: Uuid,
        plan_id: &str,
        method: PaymentMethod,
    ) -> BillingResult<CreatePaymentResponse> {
        let plan = find_plan(plan_id).ok_or_else(|| BillingError::UnknownPlan(plan_id.to_string()))?;
        let provider = self.provider(method.provider())?;

        let payment_id = Uuid::new_v4();
        let order_id = order_number(payment_id, Utc::now());
        let payment = self
            .repository
            .create_payment(&NewPayment {
                id: payment_id,
                user_id,
                amount: plan.price,
                currency: plan.currency.to_string(),
                method,
                order_id: order_id.clone(),
                metadata: json!({
                    "planId": plan.id,
                    "planName": plan.name,
                    "orderId": order_id,
                }),
            })
            .await?;

        let request = CheckoutRequest {
            payment_id: payment.id,
            order_id: order_id.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            description: format!("Ad Lab {} subscription", plan.name),
            method,
            return_url: self.return_url.clone(),
        };

        let session = match provider.create_payment(&request).await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to open {} payment {}: {}", provider.kind(), payment.id, e);
                self.repository
                    .transition_payment(
                        payment.id,
                        PaymentStatus::Failed,
                        json!({ "failureReason": e.to_string() }),
                    )
                    .await?;
                return Err(e);
            }
        };

        self.repository
            .attach_external_reference(
                payment.id,
                &session.external_id,
                json!({ "provider": provider.kind().to_string() }),
            )
            .await?;

        info!(
            "Checkout started: payment {} plan {} via {}",
            payment.id,
            plan.id,
            provider.kind()
        );

        Ok(CreatePaymentResponse {
            payment_id: payment.id,
            order_id,
            status: PaymentStatus::Pending,
            confirmation_url: session.confirmation_url,
        })
    }

    /// Current state of one of the user's payments.
    ///
    /// A pending payment with a processor reference is re-checked with the
    /// processor and the result persisted before replying.
    pub async fn payment_status(
        &self,
        user_id: Uuid,
        lookup: &PaymentLookup,
    ) -> BillingResult<Payment> {
        let payment = self
            .repository
            .find_payment(lookup)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or(BillingError::PaymentNotFound)?;

        if payment.status.is_terminal() {
            return Ok(payment);
        }
        let Some(external_id) = payment.external_id.clone() else {
            return Ok(payment);
        };

        let provider = self.provider(payment.method.provider())?;
        let status = provider.fetch_status(&external_id).await?;
        self.apply_provider_status(&payment, status).await?;

        self.repository
            .find_payment(&PaymentLookup::Id(payment.id))
            .await?
            .ok_or(BillingError::PaymentNotFound)
    }

    async fn apply_provider_status(
        &self,
        payment: &Payment,
        status: ProviderPaymentStatus,
    ) -> BillingResult<WebhookOutcome> {
        match status {
            ProviderPaymentStatus::Pending => Ok(WebhookOutcome::Ignored),
            ProviderPaymentStatus::Succeeded => {
                self.complete(payment.id, json!({ "paidAt": Utc::now().to_rfc3339() }))
                    .await
            }
            ProviderPaymentStatus::Canceled => {
                self.fail(
                    payment.id,
                    PaymentStatus::Failed,
                    json!({ "failureReason": "canceled by provider" }),
                )
                .await
            }
        }
    }

    async fn complete(&self, id: Uuid, metadata: serde_json::Value) -> BillingResult<WebhookOutcome> {
        match self.repository.complete_payment(id, metadata).await? {
            CompletionOutcome::Completed { subscription, .. } => {
                if let Some(subscription) = subscription {
                    info!(
                        "Subscription {} active until {}",
                        subscription.id, subscription.current_period_end
                    );
                }
                Ok(WebhookOutcome::Applied(PaymentStatus::Completed))
            }
            CompletionOutcome::AlreadyFinal(payment) => {
                info!("Payment {} already {}, ignoring completion", id, payment.status);
                Ok(WebhookOutcome::Unchanged)
            }
            CompletionOutcome::NotFound => Err(BillingError::PaymentNotFound),
        }
    }

    async fn fail(
        &self,
        id: Uuid,
        status: PaymentStatus,
        metadata: serde_json::Value,
    ) -> BillingResult<WebhookOutcome> {
        if self.repository.transition_payment(id, status, metadata).await? {
            info!("Payment {} marked {}", id, status);
            Ok(WebhookOutcome::Applied(status))
        } else {
            Ok(WebhookOutcome::Unchanged)
        }
    }

    /// Check a signed webhook delivery.
    ///
    /// Without a configured secret deliveries are accepted outside production
    /// and refused in production.
    pub fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> BillingResult<()> {
        let Some(secret) = self.webhook_secret.as_deref() else {
            if self.environment.is_production() {
                error!("Rejecting webhook: no webhook secret configured in production");
                return Err(BillingError::MissingWebhookSecret);
            }
            warn!("Accepting unsigned webhook: no webhook secret configured");
            return Ok(());
        };

        match webhook::signature_from_headers(headers) {
            Some(signature) if webhook::verify_signature(secret, body, signature) => Ok(()),
            Some(_) => {
                warn!("Webhook signature mismatch");
                Err(BillingError::InvalidSignature)
            }
            None => {
                warn!("Webhook delivered without a signature");
                Err(BillingError::InvalidSignature)
            }
        }
    }

    async fn resolve_payment(&self, target: &webhook::WebhookTarget) -> BillingResult<Payment> {
        let mut lookups = Vec::new();
        if let Some(id) = target.payment_id {
            lookups.push(PaymentLookup::Id(id));
        }
        if let Some(order_id) = &target.order_id {
            lookups.push(PaymentLookup::OrderId(order_id.clone()));
        }
        if let Some(external_id) = &target.external_id {
            lookups.push(PaymentLookup::ExternalId(external_id.clone()));
        }

        for lookup in &lookups {
            if let Some(payment) = self.repository.find_payment(lookup).await? {
                return Ok(payment);
            }
        }
        Err(BillingError::PaymentNotFound)
    }

    /// Apply a verified webhook payload
    pub async fn process_webhook(&self, payload: &serde_json::Value) -> BillingResult<WebhookOutcome> {
        let event = webhook::classify(payload);
        if let WebhookEvent::Ignored(name) = &event {
            info!("Ignoring webhook event {:?}", name);
            return Ok(WebhookOutcome::Ignored);
        }

        let target = webhook::extract_target(payload);
        let payment = self.resolve_payment(&target).await.inspect_err(|_| {
            warn!("Webhook references an unknown payment: {:?}", target);
        })?;

        info!("Webhook {:?} for payment {}", event, payment.id);
        match event {
            WebhookEvent::Succeeded | WebhookEvent::SubscriptionCreated => {
                let metadata = webhook::paid_metadata(payload);
                if let Some(paid) = metadata
                    .get("paidAmount")
                    .and_then(|v| v.as_str())
                    .and_then(parse_amount)
                    .filter(|paid| *paid != payment.amount)
                {
                    warn!(
                        "Payment {} reported paid amount {} kopecks, expected {}",
                        payment.id, paid, payment.amount
                    );
                }
                self.complete(payment.id, metadata).await
            }
            WebhookEvent::Failed => {
                self.fail(
                    payment.id,
                    PaymentStatus::Failed,
                    json!({ "failureReason": "payment failed" }),
                )
                .await
            }
            WebhookEvent::Expired => {
                self.fail(
                    payment.id,
                    PaymentStatus::Cancelled,
                    json!({ "failureReason": "expired" }),
                )
                .await
            }
            WebhookEvent::SubscriptionCancelled => {
                self.repository
                    .cancel_subscription_for_payment(payment.id)
                    .await?;
                Ok(WebhookOutcome::SubscriptionCancelled)
            }
            WebhookEvent::Ignored(_) => Ok(WebhookOutcome::Ignored),
        }
    }

    /// YooKassa notifications are unsigned, so the payment is re-read from the API
    pub async fn process_yookassa_notification(
        &self,
        payload: &serde_json::Value,
    ) -> BillingResult<WebhookOutcome> {
        let external_id = payload
            .get("object")
            .and_then(|o| o.get("id"))
            .and_then(|id| id.as_str())
            .ok_or_else(|| BillingError::InvalidPayload("missing object.id".to_string()))?;

        let payment = self
            .repository
            .find_payment(&PaymentLookup::ExternalId(external_id.to_string()))
            .await?
            .ok_or(BillingError::PaymentNotFound)?;

        let status = self
            .provider(ProviderKind::YooKassa)?
            .fetch_status(external_id)
            .await?;
        self.apply_provider_status(&payment, status).await
    }

    pub async fn payment_history(&self, user_id: Uuid) -> BillingResult<Vec<Payment>> {
        Ok(self
            .repository
            .list_payments(user_id, PAYMENT_HISTORY_LIMIT)
            .await?)
    }

    pub async fn active_subscription(&self, user_id: Uuid) -> BillingResult<Option<Subscription>> {
        Ok(self
            .repository
            .active_subscription(user_id, Utc::now())
            .await?)
    }

    pub async fn cancel_subscription(&self, user_id: Uuid) -> BillingResult<bool> {
        let cancelled = self.repository.cancel_user_subscriptions(user_id).await?;
        info!("Cancelled {} subscription(s) for user {}", cancelled, user_id);
        Ok(cancelled > 0)
    }
}
