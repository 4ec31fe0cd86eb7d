//! Payment reconciliation: checkout, provider clients, webhooks and polling

use common::error::DatabaseError;
use thiserror::Error;

pub mod provider;
pub mod service;
pub mod tribute;
pub mod webhook;
pub mod yookassa;

pub use service::BillingService;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("{0} payments are not configured")]
    ProviderNotConfigured(&'static str),

    /// Processor rejected the call or returned something unusable
    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook secret is not configured")]
    MissingWebhookSecret,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

pub type BillingResult<T> = Result<T, BillingError>;
