use anyhow::Result;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod billing;
mod config;
mod error;
mod generation;
mod jobs;
mod middleware;
mod models;
mod rate_limiter;
mod repositories;
mod routes;
mod state;

use auth::{AuthState, blacklist::BlacklistConfig};
use common::{
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
    environment::RuntimeEnvironment,
};

use crate::{
    billing::{BillingService, tribute::TributeClient, yookassa::YooKassaClient},
    config::ApiConfig,
    generation::CopyGenerator,
    rate_limiter::RateLimiter,
    repositories::{PgBillingRepository, QueryRepository},
    state::AppState,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Ad Lab API service");

    let config = ApiConfig::from_env()?;
    let environment = RuntimeEnvironment::from_env();

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;
    if !health_check(&pool).await {
        anyhow::bail!("Failed to connect to database");
    }
    run_migrations(&pool, &MIGRATOR).await?;

    let auth = AuthState::from_env(pool.clone()).await?;

    let mut billing = BillingService::new(
        Arc::new(PgBillingRepository::new(pool.clone())),
        environment,
        config.payment_return_url(),
    )
    .with_webhook_secret(config.tribute_webhook_secret.clone());
    match config.tribute() {
        Some(tribute) => billing = billing.with_provider(Arc::new(TributeClient::new(tribute))),
        None => warn!("Tribute payments disabled: TRIBUTE_API_KEY not set"),
    }
    match config.yookassa() {
        Some(yookassa) => {
            billing = billing.with_provider(Arc::new(YooKassaClient::new(yookassa)))
        }
        None => warn!("Card and SBP payments disabled: YooKassa credentials not set"),
    }

    let generator = config.generator().map(CopyGenerator::new);
    if generator.is_none() {
        warn!("Ad copy generation disabled: OPENAI_API_KEY not set");
    }

    let rate_limiter = RateLimiter::new(config.rate_limiter());
    info!("Rate limits: {:?}", rate_limiter.config());

    let _scheduler = jobs::start_cleanup_jobs(
        rate_limiter.clone(),
        auth.blacklist().clone(),
        BlacklistConfig::from_env().max_age_days,
    )
    .await?;

    let app_state = AppState {
        db_pool: pool.clone(),
        auth,
        billing,
        rate_limiter,
        generator,
        queries: QueryRepository::new(pool),
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!(
        "API service listening on {} ({:?})",
        config.bind_address, environment
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
