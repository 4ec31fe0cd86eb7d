//! In-memory billing repository used by tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::billing::{
    BillingRepository, CompletionOutcome, PaymentLookup, subscription_metadata,
    subscription_period,
};
use crate::models::{NewPayment, Payment, PaymentStatus, Subscription, SubscriptionStatus};

#[derive(Default)]
struct Tables {
    payments: Vec<Payment>,
    subscriptions: Vec<Subscription>,
}

#[derive(Clone, Default)]
pub struct MemoryBillingRepository {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryBillingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.tables.lock().await.subscriptions.clone()
    }

    pub async fn payment(&self, id: Uuid) -> Option<Payment> {
        self.tables
            .lock()
            .await
            .payments
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }
}

fn merge(target: &mut serde_json::Value, extra: serde_json::Value) {
    if let (Some(target), serde_json::Value::Object(extra)) = (target.as_object_mut(), extra) {
        target.extend(extra);
    }
}

#[async_trait]
impl BillingRepository for MemoryBillingRepository {
    async fn create_payment(&self, new: &NewPayment) -> DatabaseResult<Payment> {
        let now = Utc::now();
        let payment = Payment {
            id: new.id,
            user_id: new.user_id,
            amount: new.amount,
            currency: new.currency.clone(),
            method: new.method,
            status: PaymentStatus::Pending,
            external_id: None,
            order_id: Some(new.order_id.clone()),
            metadata: new.metadata.clone(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.tables.lock().await.payments.push(payment.clone());
        Ok(payment)
    }

    async fn find_payment(&self, lookup: &PaymentLookup) -> DatabaseResult<Option<Payment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .iter()
            .find(|p| match lookup {
                PaymentLookup::Id(id) => p.id == *id,
                PaymentLookup::ExternalId(ext) => p.external_id.as_deref() == Some(ext),
                PaymentLookup::OrderId(order) => p.order_id.as_deref() == Some(order),
            })
            .cloned())
    }

    async fn attach_external_reference(
        &self,
        id: Uuid,
        external_id: &str,
        metadata: serde_json::Value,
    ) -> DatabaseResult<Option<Payment>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.payments.iter_mut().find(|p| p.id == id).map(|p| {
            p.external_id = Some(external_id.to_string());
            merge(&mut p.metadata, metadata);
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        status: PaymentStatus,
        metadata: serde_json::Value,
    ) -> DatabaseResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables
            .payments
            .iter_mut()
            .find(|p| p.id == id && p.status == PaymentStatus::Pending)
        {
            Some(payment) => {
                payment.status = status;
                merge(&mut payment.metadata, metadata);
                payment.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn complete_payment(
        &self,
        id: Uuid,
        metadata: serde_json::Value,
    ) -> DatabaseResult<CompletionOutcome> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        let Some(payment) = tables.payments.iter_mut().find(|p| p.id == id) else {
            return Ok(CompletionOutcome::NotFound);
        };
        if payment.status != PaymentStatus::Pending {
            return Ok(CompletionOutcome::AlreadyFinal(payment.clone()));
        }

        payment.status = PaymentStatus::Completed;
        payment.completed_at = Some(now);
        payment.updated_at = now;
        merge(&mut payment.metadata, metadata);
        let payment = payment.clone();

        let subscription = match payment.plan_id() {
            Some(plan_id)
                if !tables
                    .subscriptions
                    .iter()
                    .any(|s| s.payment_id == Some(payment.id)) =>
            {
                let (start, end) = subscription_period(now);
                let subscription = Subscription {
                    id: Uuid::new_v4(),
                    user_id: payment.user_id,
                    plan_id: plan_id.to_string(),
                    status: SubscriptionStatus::Active,
                    current_period_start: start,
                    current_period_end: end,
                    cancelled_at: None,
                    payment_id: Some(payment.id),
                    metadata: subscription_metadata(&payment),
                    created_at: now,
                };
                tables.subscriptions.push(subscription.clone());
                Some(subscription)
            }
            _ => None,
        };

        Ok(CompletionOutcome::Completed {
            payment,
            subscription,
        })
    }

    async fn list_payments(&self, user_id: Uuid, limit: i64) -> DatabaseResult<Vec<Payment>> {
        let tables = self.tables.lock().await;
        let mut payments: Vec<Payment> = tables
            .payments
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        payments.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(payments)
    }

    async fn active_subscription(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<Subscription>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id && s.grants_access_at(now))
            .max_by_key(|s| s.current_period_end)
            .cloned())
    }

    async fn cancel_subscription_for_payment(&self, payment_id: Uuid) -> DatabaseResult<bool> {
        let mut tables = self.tables.lock().await;
        let mut changed = false;
        for subscription in tables
            .subscriptions
            .iter_mut()
            .filter(|s| s.payment_id == Some(payment_id))
        {
            subscription.status = SubscriptionStatus::Cancelled;
            subscription.cancelled_at = Some(Utc::now());
            changed = true;
        }
        Ok(changed)
    }

    async fn cancel_user_subscriptions(&self, user_id: Uuid) -> DatabaseResult<u64> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let mut count = 0;
        for subscription in tables
            .subscriptions
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.grants_access_at(now))
        {
            subscription.status = SubscriptionStatus::Cancelled;
            subscription.cancelled_at = Some(now);
            count += 1;
        }
        Ok(count)
    }
}
