//! Payment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Lifecycle of a payment; everything but `Pending` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("Unknown payment status: {}", other)),
        }
    }
}

/// Upstream payment processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Tribute,
    YooKassa,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Tribute => f.write_str("tribute"),
            ProviderKind::YooKassa => f.write_str("yookassa"),
        }
    }
}

/// Payment method chosen at checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Tribute,
    Card,
    Sbp,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Tribute => "tribute",
            PaymentMethod::Card => "card",
            PaymentMethod::Sbp => "sbp",
        }
    }

    /// Processor that handles this method
    pub fn provider(&self) -> ProviderKind {
        match self {
            PaymentMethod::Tribute => ProviderKind::Tribute,
            PaymentMethod::Card | PaymentMethod::Sbp => ProviderKind::YooKassa,
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tribute" => Ok(PaymentMethod::Tribute),
            "card" => Ok(PaymentMethod::Card),
            "sbp" => Ok(PaymentMethod::Sbp),
            other => Err(format!("Unknown payment method: {}", other)),
        }
    }
}

/// One attempt to pay for a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Minor units (kopecks)
    pub amount: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Identifier assigned by the processor
    pub external_id: Option<String>,
    /// Order number we generated, `adlab_<payment id>_<unix ts>`
    pub order_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Plan the payment was made for, if recorded in metadata
    pub fn plan_id(&self) -> Option<&str> {
        self.metadata.get("planId").and_then(|v| v.as_str())
    }
}

/// Payment to be inserted in `pending` state
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub order_id: String,
    pub metadata: serde_json::Value,
}

const ORDER_PREFIX: &str = "adlab";

/// Order number embedding the local payment id
pub fn order_number(payment_id: Uuid, issued_at: DateTime<Utc>) -> String {
    format!("{}_{}_{}", ORDER_PREFIX, payment_id, issued_at.timestamp())
}
