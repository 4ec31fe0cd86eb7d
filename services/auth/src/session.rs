//! Session lifecycle: create, read, refresh check and delete
//!
//! The session lives entirely in a signed cookie. Reading it honours the
//! logout flag first, then signature and expiry, then the blacklist.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use common::environment::RuntimeEnvironment;
use tracing::{debug, info, warn};

use crate::{
    blacklist::BlacklistStore,
    cookies::{self, LOGOUT_FLAG_COOKIE, SESSION_COOKIE, SetCookies},
    jwt::{JwtService, SessionData, TokenError},
};

/// Sessions with less than this many seconds left are refreshed
pub const REFRESH_THRESHOLD_SECONDS: i64 = 300;

const PRODUCTION_MAX_AGE_SECONDS: i64 = 365 * 24 * 60 * 60;
const DEVELOPMENT_MAX_AGE_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Session cookie configuration
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub environment: RuntimeEnvironment,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self {
            environment: RuntimeEnvironment::from_env(),
        }
    }

    /// Secure cookies are only issued in production
    pub fn secure(&self) -> bool {
        self.environment.is_production()
    }

    /// One year in production, thirty days otherwise
    pub fn max_age_seconds(&self) -> i64 {
        if self.environment.is_production() {
            PRODUCTION_MAX_AGE_SECONDS
        } else {
            DEVELOPMENT_MAX_AGE_SECONDS
        }
    }
}

/// Outcome of inspecting the cookies of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Valid(SessionData),
    /// No session cookie present
    Missing,
    /// The logout flag is set; the session cookie was not inspected
    LoggedOut,
    /// Signature or expiry check failed; the cookie should be dropped
    Invalid,
    /// Token is fine but the user is blacklisted; the cookie should be dropped
    Blacklisted,
}

impl SessionStatus {
    pub fn into_session(self) -> Option<SessionData> {
        match self {
            SessionStatus::Valid(session) => Some(session),
            _ => None,
        }
    }

    /// Whether the stale session cookie should be removed from the client
    pub fn should_clear(&self) -> bool {
        matches!(self, SessionStatus::Invalid | SessionStatus::Blacklisted)
    }
}

/// Session manager for minting and validating session cookies
#[derive(Clone)]
pub struct SessionManager {
    jwt: JwtService,
    blacklist: BlacklistStore,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(jwt: JwtService, blacklist: BlacklistStore, config: SessionConfig) -> Self {
        Self {
            jwt,
            blacklist,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn blacklist(&self) -> &BlacklistStore {
        &self.blacklist
    }

    /// Sign the session into a cookie and lift any lingering logout flag
    pub fn create(&self, session: &SessionData) -> Result<SetCookies, TokenError> {
        let max_age = self.config.max_age_seconds();
        let token = self.jwt.sign(session, max_age)?;

        let mut set = SetCookies::new();
        set.push(cookies::session_cookie(token, max_age, self.config.secure()));
        set.push(cookies::clear_logout_flag_cookie());

        info!("Created session for user: {}", session.user.id);
        Ok(set)
    }

    /// Read the session from the request cookies.
    ///
    /// Returns the removal directives to attach to the response when the
    /// cookie turned out to be unusable.
    pub async fn get(&self, jar: &CookieJar) -> (Option<SessionData>, SetCookies) {
        let status = self.inspect(jar).await;
        let mut set = SetCookies::new();
        if status.should_clear() {
            for cookie in cookies::clear_session_cookies(self.config.secure()) {
                set.push(cookie);
            }
        }
        (status.into_session(), set)
    }

    /// Request-scoped variant used by middleware, where only headers are at hand
    pub async fn validate_for_request(&self, headers: &HeaderMap) -> SessionStatus {
        self.inspect(&CookieJar::from_headers(headers)).await
    }

    async fn inspect(&self, jar: &CookieJar) -> SessionStatus {
        if jar.get(LOGOUT_FLAG_COOKIE).is_some() {
            debug!("Logout flag present, ignoring session cookie");
            return SessionStatus::LoggedOut;
        }

        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return SessionStatus::Missing;
        };

        let session = match self.jwt.verify(cookie.value()) {
            Ok(session) => session,
            Err(TokenError::SignatureMismatch) => {
                warn!("Session cookie was signed with a different secret; JWT_SECRET likely rotated");
                return SessionStatus::Invalid;
            }
            Err(TokenError::Expired) => {
                debug!("Session cookie expired");
                return SessionStatus::Invalid;
            }
            Err(e) => {
                warn!("Session cookie is corrupted: {}", e);
                return SessionStatus::Invalid;
            }
        };

        if self.blacklist.is_blacklisted(&session.user).await {
            info!("Rejecting session of blacklisted user: {}", session.user.id);
            return SessionStatus::Blacklisted;
        }

        SessionStatus::Valid(session)
    }

    /// Clear the session with every removal variant, then raise the logout flag
    pub fn delete(&self) -> SetCookies {
        let mut set = SetCookies::new();
        for cookie in cookies::clear_session_cookies(self.config.secure()) {
            set.push(cookie);
        }
        set.push(cookies::logout_flag_cookie(self.config.secure()));
        set
    }
}

/// True when fewer than five minutes remain before the embedded expiry
pub fn needs_refresh(session: &SessionData) -> bool {
    needs_refresh_at(session, Utc::now().timestamp())
}

pub fn needs_refresh_at(session: &SessionData, now: i64) -> bool {
    session.expires_at - now < REFRESH_THRESHOLD_SECONDS
}
