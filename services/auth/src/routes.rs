//! Authentication routes

use axum::{
    Json, Router,
    extract::{Query, State},
    middleware,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    AuthState,
    blacklist::{BlacklistCriteria, BlacklistEntry},
    cookies::{self, OAUTH_STATE_COOKIE, OAUTH_VERIFIER_COOKIE, SetCookies},
    error::{AuthError, AuthResult},
    jwt::{SessionData, SessionUser},
    middleware::{CurrentSession, require_admin, require_session},
    models::{NewUser, User},
    oauth::UpstreamTokens,
    repositories::user::{hash_password, verify_password},
    validation,
};

/// Request for account registration
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request for password login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Current session as seen by the client
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: Option<SessionUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl From<Option<&SessionData>> for SessionResponse {
    fn from(session: Option<&SessionData>) -> Self {
        Self {
            user: session.map(|s| s.user.clone()),
            expires_at: session.map(|s| s.expires_at),
        }
    }
}

/// Query string Google appends to the callback
#[derive(Deserialize)]
pub struct GoogleCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Request for adding a blacklist entry
#[derive(Deserialize)]
pub struct BlacklistAddRequest {
    #[serde(flatten)]
    pub criteria: BlacklistCriteria,
    pub reason: Option<String>,
}

/// Request for the age-based blacklist cleanup
#[derive(Deserialize)]
pub struct BlacklistCleanupRequest {
    pub days: i64,
}

/// Create the router for the authentication endpoints
pub fn create_router(state: AuthState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/api/admin/blacklist",
            get(list_blacklist)
                .post(add_to_blacklist)
                .delete(remove_from_blacklist),
        )
        .route("/api/admin/blacklist/cleanup", post(cleanup_blacklist))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(current_session))
        .route("/api/auth/google", get(google_start))
        .route("/api/auth/google/callback", get(google_callback))
        .merge(admin_routes)
        .with_state(state)
}

/// Session for a freshly authenticated user; password sessions carry no
/// upstream tokens and expire together with the cookie.
fn session_for(state: &AuthState, user: &User, upstream: Option<UpstreamTokens>) -> SessionData {
    match upstream {
        Some(tokens) => SessionData {
            user: user.session_user(),
            access_token: Some(tokens.access_token),
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
        },
        None => SessionData {
            user: user.session_user(),
            access_token: None,
            refresh_token: None,
            expires_at: Utc::now().timestamp() + state.sessions.config().max_age_seconds(),
        },
    }
}

/// Account registration endpoint
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    validation::validate_registration(&payload.name, &payload.email, &payload.password)
        .map_err(AuthError::Validation)?;

    if state.users.find_by_email(&payload.email).await?.is_some() {
        return Err(AuthError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let user = state
        .users
        .create(&NewUser {
            name: payload.name.trim().to_string(),
            email: payload.email,
            password_hash: Some(hash_password(&payload.password)?),
            google_id: None,
            avatar_url: None,
        })
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                AuthError::Conflict("An account with this email already exists".to_string())
            } else {
                e.into()
            }
        })?;

    let session = session_for(&state, &user, None);
    let cookies = state.sessions.create(&session)?;

    Ok((cookies, Json(SessionResponse::from(Some(&session)))))
}

/// Password login endpoint
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    info!("Login attempt for user: {}", payload.email);

    let user = state
        .users
        .find_by_email(&payload.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(&user, &payload.password) {
        return Err(AuthError::InvalidCredentials);
    }

    if state.blacklist().is_blacklisted(&user.session_user()).await {
        warn!("Refusing login for blacklisted user: {}", user.id);
        return Err(AuthError::Forbidden);
    }

    let session = session_for(&state, &user, None);
    let cookies = state.sessions.create(&session)?;

    Ok((cookies, Json(SessionResponse::from(Some(&session)))))
}

/// Logout endpoint
pub async fn logout(State(state): State<AuthState>) -> impl IntoResponse {
    info!("Logout request");
    (state.sessions.delete(), Json(json!({ "success": true })))
}

/// Current session endpoint
pub async fn current_session(
    State(state): State<AuthState>,
    jar: CookieJar,
) -> impl IntoResponse {
    let (session, cookies) = state.sessions.get(&jar).await;
    (cookies, Json(SessionResponse::from(session.as_ref())))
}

/// Redirect to Google's consent screen
pub async fn google_start(State(state): State<AuthState>) -> AuthResult<impl IntoResponse> {
    let google = state
        .google
        .as_ref()
        .ok_or(AuthError::NotConfigured("Google sign-in"))?;

    let (url, csrf_state, verifier) = google.authorize_url();
    let mut cookies = SetCookies::new();
    for cookie in cookies::oauth_cookies(&csrf_state, &verifier, state.sessions.config().secure()) {
        cookies.push(cookie);
    }

    Ok((cookies, Redirect::to(&url)))
}

/// Google redirects back here with an authorization code
pub async fn google_callback(
    State(state): State<AuthState>,
    jar: CookieJar,
    Query(params): Query<GoogleCallbackParams>,
) -> AuthResult<impl IntoResponse> {
    let google = state
        .google
        .as_ref()
        .ok_or(AuthError::NotConfigured("Google sign-in"))?;

    let mut cookies = SetCookies::new();
    for cookie in cookies::clear_oauth_cookies() {
        cookies.push(cookie);
    }

    if let Some(error) = params.error {
        warn!("Google sign-in was declined: {}", error);
        return Ok((cookies, Redirect::to("/auth?error=oauth_declined")));
    }

    let expected_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    if expected_state.is_none() || params.state != expected_state {
        warn!("Google callback state mismatch");
        return Ok((cookies, Redirect::to("/auth?error=oauth_state")));
    }

    let (Some(code), Some(verifier)) = (
        params.code,
        jar.get(OAUTH_VERIFIER_COOKIE).map(|c| c.value().to_string()),
    ) else {
        return Err(AuthError::Validation(
            "Missing authorization code".to_string(),
        ));
    };

    let tokens = google
        .exchange_code(code, verifier)
        .await
        .map_err(|e| AuthError::Provider(e.to_string()))?;
    let profile = google
        .fetch_profile(&tokens.access_token)
        .await
        .map_err(|e| AuthError::Provider(e.to_string()))?;

    if !profile.verified_email {
        return Ok((cookies, Redirect::to("/auth?error=email_unverified")));
    }

    let name = profile
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| profile.email.split('@').next().unwrap_or_default().to_string());
    let user = state
        .users
        .upsert_google_user(&profile.id, &profile.email, &name, profile.picture.as_deref())
        .await?;

    if state.blacklist().is_blacklisted(&user.session_user()).await {
        warn!("Refusing Google sign-in for blacklisted user: {}", user.id);
        return Ok((cookies, Redirect::to("/auth?error=blocked")));
    }

    let session = session_for(&state, &user, Some(tokens));
    cookies.extend(state.sessions.create(&session)?);

    info!("Google sign-in completed for user: {}", user.id);
    Ok((cookies, Redirect::to("/")))
}

/// List blacklist entries
pub async fn list_blacklist(
    State(state): State<AuthState>,
    CurrentSession(session): CurrentSession,
) -> AuthResult<Json<Vec<BlacklistEntry>>> {
    require_admin(&state, &session)?;
    Ok(Json(state.blacklist().list().await))
}

/// Add or replace a blacklist entry
pub async fn add_to_blacklist(
    State(state): State<AuthState>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<BlacklistAddRequest>,
) -> AuthResult<Json<BlacklistEntry>> {
    require_admin(&state, &session)?;
    let entry = state
        .blacklist()
        .add(payload.criteria, payload.reason)
        .await?;
    Ok(Json(entry))
}

/// Remove matching blacklist entries
pub async fn remove_from_blacklist(
    State(state): State<AuthState>,
    CurrentSession(session): CurrentSession,
    Json(criteria): Json<BlacklistCriteria>,
) -> AuthResult<impl IntoResponse> {
    require_admin(&state, &session)?;
    let removed = state.blacklist().remove(&criteria).await?;
    Ok(Json(json!({ "removed": removed })))
}

/// Purge entries older than the given number of days
pub async fn cleanup_blacklist(
    State(state): State<AuthState>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<BlacklistCleanupRequest>,
) -> AuthResult<impl IntoResponse> {
    require_admin(&state, &session)?;
    if payload.days < 0 {
        return Err(AuthError::Validation("days must not be negative".to_string()));
    }
    let removed = state.blacklist().clean_older_than(payload.days).await;
    Ok(Json(json!({ "removed": removed })))
}
