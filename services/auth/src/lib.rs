//! Authentication for Ad Lab
//!
//! Signed cookie sessions, the forced-logout blacklist, password and Google
//! sign-in, and the middleware that guards the rest of the API.

pub mod blacklist;
pub mod cookies;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod oauth;
pub mod repositories;
pub mod routes;
pub mod session;
pub mod validation;

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::{
    blacklist::{BlacklistConfig, BlacklistStore},
    jwt::{JwtConfig, JwtService},
    oauth::{GoogleOAuth, GoogleOAuthConfig},
    repositories::UserRepository,
    session::{SessionConfig, SessionManager},
};

/// State shared by the authentication routes and middleware
#[derive(Clone)]
pub struct AuthState {
    pub sessions: SessionManager,
    pub users: UserRepository,
    pub google: Option<GoogleOAuth>,
    /// Lower-cased addresses allowed to manage the blacklist
    pub admin_emails: Arc<Vec<String>>,
}

impl AuthState {
    /// Assemble the authentication state from environment variables
    pub async fn from_env(pool: PgPool) -> Result<Self> {
        let jwt_service = JwtService::new(&JwtConfig::from_env()?);
        let blacklist = BlacklistStore::load(&BlacklistConfig::from_env()).await?;
        let sessions = SessionManager::new(jwt_service, blacklist, SessionConfig::from_env());

        let google = match GoogleOAuthConfig::from_env() {
            Some(config) => Some(GoogleOAuth::new(config)?),
            None => {
                info!("Google sign-in disabled: GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set");
                None
            }
        };

        let admin_emails = std::env::var("ADMIN_EMAILS")
            .map(|raw| parse_admin_emails(&raw))
            .unwrap_or_default();

        Ok(Self {
            sessions,
            users: UserRepository::new(pool),
            google,
            admin_emails: Arc::new(admin_emails),
        })
    }

    pub fn blacklist(&self) -> &BlacklistStore {
        self.sessions.blacklist()
    }
}

fn parse_admin_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
