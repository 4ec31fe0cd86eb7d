//! Billing repository: payments and the subscriptions they create

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    NewPayment, Payment, PaymentStatus, Subscription, SubscriptionStatus,
    subscription::SUBSCRIPTION_PERIOD_DAYS,
};

/// Ways a payment can be located
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentLookup {
    Id(Uuid),
    ExternalId(String),
    OrderId(String),
}

/// Result of moving a payment to `completed`
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// This call performed the transition
    Completed {
        payment: Payment,
        subscription: Option<Subscription>,
    },
    /// The payment had already left `pending`; nothing was written
    AlreadyFinal(Payment),
    NotFound,
}

/// Storage for payments and subscriptions.
///
/// Status changes only ever leave `pending`, so a replayed webhook or a poll
/// racing a webhook cannot reopen or double-complete a payment.
#[async_trait]
pub trait BillingRepository: Send + Sync {
    async fn create_payment(&self, payment: &NewPayment) -> DatabaseResult<Payment>;

    async fn find_payment(&self, lookup: &PaymentLookup) -> DatabaseResult<Option<Payment>>;

    /// Record the processor's identifier and merge extra metadata
    async fn attach_external_reference(
        &self,
        id: Uuid,
        external_id: &str,
        metadata: serde_json::Value,
    ) -> DatabaseResult<Option<Payment>>;

    /// Move a pending payment to `status`; false when it was no longer pending
    async fn transition_payment(
        &self,
        id: Uuid,
        status: PaymentStatus,
        metadata: serde_json::Value,
    ) -> DatabaseResult<bool>;

    /// Complete a pending payment and, if it references a plan, create its
    /// subscription in the same transaction
    async fn complete_payment(
        &self,
        id: Uuid,
        metadata: serde_json::Value,
    ) -> DatabaseResult<CompletionOutcome>;

    async fn list_payments(&self, user_id: Uuid, limit: i64) -> DatabaseResult<Vec<Payment>>;

    /// Subscription granting access at `now`, latest period end first
    async fn active_subscription(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<Subscription>>;

    async fn cancel_subscription_for_payment(&self, payment_id: Uuid) -> DatabaseResult<bool>;

    async fn cancel_user_subscriptions(&self, user_id: Uuid) -> DatabaseResult<u64>;
}

/// Start and end of a subscription created at `now`
pub fn subscription_period(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now, now + Duration::days(SUBSCRIPTION_PERIOD_DAYS))
}

/// Metadata stored on a subscription, linking it to its payment
pub fn subscription_metadata(payment: &Payment) -> serde_json::Value {
    serde_json::json!({
        "paymentId": payment.id,
        "orderId": payment.order_id,
        "method": payment.method,
    })
}

const PAYMENT_COLUMNS: &str = "id, user_id, amount, currency, method, status, external_id, \
     order_id, metadata, created_at, updated_at, completed_at";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, status, current_period_start, \
     current_period_end, cancelled_at, payment_id, metadata, created_at";

fn payment_from_row(row: &PgRow) -> DatabaseResult<Payment> {
    let method: String = row.get("method");
    let status: String = row.get("status");

    Ok(Payment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        method: method.parse().map_err(DatabaseError::Corrupt)?,
        status: status.parse().map_err(DatabaseError::Corrupt)?,
        external_id: row.get("external_id"),
        order_id: row.get("order_id"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
    })
}

fn subscription_from_row(row: &PgRow) -> DatabaseResult<Subscription> {
    let status: String = row.get("status");

    Ok(Subscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        plan_id: row.get("plan_id"),
        status: status.parse().map_err(DatabaseError::Corrupt)?,
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        cancelled_at: row.get("cancelled_at"),
        payment_id: row.get("payment_id"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
    })
}

/// Postgres-backed billing repository
#[derive(Clone)]
pub struct PgBillingRepository {
    pool: PgPool,
}

impl PgBillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingRepository for PgBillingRepository {
    async fn create_payment(&self, payment: &NewPayment) -> DatabaseResult<Payment> {
        info!(
            "Creating payment {} for user {}",
            payment.id, payment.user_id
        );

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payments (id, user_id, amount, currency, method, status, order_id, metadata)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.method.as_str())
        .bind(&payment.order_id)
        .bind(&payment.metadata)
        .fetch_one(&self.pool)
        .await?;

        payment_from_row(&row)
    }

    async fn find_payment(&self, lookup: &PaymentLookup) -> DatabaseResult<Option<Payment>> {
        let query = match lookup {
            PaymentLookup::Id(id) => {
                sqlx::query(&format!(
                    "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
                ))
                .bind(*id)
                .fetch_optional(&self.pool)
                .await?
            }
            PaymentLookup::ExternalId(external_id) => {
                sqlx::query(&format!(
                    "SELECT {PAYMENT_COLUMNS} FROM payments WHERE external_id = $1"
                ))
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?
            }
            PaymentLookup::OrderId(order_id) => {
                sqlx::query(&format!(
                    "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1"
                ))
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        query.as_ref().map(payment_from_row).transpose()
    }

    async fn attach_external_reference(
        &self,
        id: Uuid,
        external_id: &str,
        metadata: serde_json::Value,
    ) -> DatabaseResult<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payments
            SET external_id = $2, metadata = metadata || $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(external_id)
        .bind(&metadata)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        status: PaymentStatus,
        metadata: serde_json::Value,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, metadata = metadata || $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        let changed = result.rows_affected() > 0;
        debug!("Payment {} -> {}: changed={}", id, status, changed);
        Ok(changed)
    }

    async fn complete_payment(
        &self,
        id: Uuid,
        metadata: serde_json::Value,
    ) -> DatabaseResult<CompletionOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE payments
            SET status = 'completed', metadata = metadata || $2,
                completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&metadata)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(match self.find_payment(&PaymentLookup::Id(id)).await? {
                Some(payment) => CompletionOutcome::AlreadyFinal(payment),
                None => CompletionOutcome::NotFound,
            });
        };
        let payment = payment_from_row(&row)?;

        let subscription = match payment.plan_id() {
            Some(plan_id) => {
                let (start, end) = subscription_period(Utc::now());
                let row = sqlx::query(&format!(
                    r#"
                    INSERT INTO subscriptions
                        (id, user_id, plan_id, status, current_period_start, current_period_end,
                         payment_id, metadata)
                    VALUES ($1, $2, $3, 'active', $4, $5, $6, $7)
                    ON CONFLICT (payment_id) DO NOTHING
                    RETURNING {SUBSCRIPTION_COLUMNS}
                    "#
                ))
                .bind(Uuid::new_v4())
                .bind(payment.user_id)
                .bind(plan_id)
                .bind(start)
                .bind(end)
                .bind(payment.id)
                .bind(subscription_metadata(&payment))
                .fetch_optional(&mut *tx)
                .await?;

                row.as_ref().map(subscription_from_row).transpose()?
            }
            None => None,
        };

        tx.commit().await?;

        info!(
            "Payment {} completed, subscription created: {}",
            payment.id,
            subscription.is_some()
        );
        Ok(CompletionOutcome::Completed {
            payment,
            subscription,
        })
    }

    async fn list_payments(&self, user_id: Uuid, limit: i64) -> DatabaseResult<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn active_subscription(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE user_id = $1
              AND status IN ('active', 'trialing')
              AND current_period_end > $2
            ORDER BY current_period_end DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn cancel_subscription_for_payment(&self, payment_id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2, cancelled_at = NOW(), updated_at = NOW()
            WHERE payment_id = $1 AND status IN ('active', 'trialing')
            "#,
        )
        .bind(payment_id)
        .bind(SubscriptionStatus::Cancelled.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel_user_subscriptions(&self, user_id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2, cancelled_at = NOW(), updated_at = NOW()
            WHERE user_id = $1 AND status IN ('active', 'trialing')
            "#,
        )
        .bind(user_id)
        .bind(SubscriptionStatus::Cancelled.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
