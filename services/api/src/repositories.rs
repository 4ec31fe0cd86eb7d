//! Repositories for database operations

pub mod billing;
#[cfg(test)]
pub mod memory;
pub mod query;

pub use billing::{BillingRepository, CompletionOutcome, PaymentLookup, PgBillingRepository};
pub use query::QueryRepository;
