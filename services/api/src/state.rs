//! Application state shared across handlers

use auth::AuthState;
use sqlx::PgPool;

use crate::{
    billing::BillingService, generation::CopyGenerator, rate_limiter::RateLimiter,
    repositories::QueryRepository,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub auth: AuthState,
    pub billing: BillingService,
    pub rate_limiter: RateLimiter,
    /// Absent when no generation backend is configured
    pub generator: Option<CopyGenerator>,
    pub queries: QueryRepository,
}
