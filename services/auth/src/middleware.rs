//! Session middleware and extractors

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    AuthState,
    cookies::{self, SetCookies},
    error::AuthError,
    jwt::SessionData,
    session::{SessionStatus, needs_refresh},
};

/// Path of the login surface unauthenticated page requests are sent to
pub const LOGIN_PATH: &str = "/auth";

/// Authenticated session placed in request extensions by [`require_session`]
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionData);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}

fn unauthenticated(is_api: bool, set: SetCookies) -> Response {
    if is_api {
        (set, AuthError::Unauthorized).into_response()
    } else {
        (set, Redirect::to(LOGIN_PATH)).into_response()
    }
}

/// Reject requests without a valid session and keep upstream tokens fresh.
///
/// API paths get a 401 JSON body, everything else is redirected to the login
/// page. A session whose upstream token cannot be refreshed is deleted.
pub async fn require_session(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let is_api = req.uri().path().starts_with("/api/");

    let mut session = match state.sessions.validate_for_request(req.headers()).await {
        SessionStatus::Valid(session) => session,
        status => {
            let mut set = SetCookies::new();
            if status.should_clear() {
                for cookie in cookies::clear_session_cookies(state.sessions.config().secure()) {
                    set.push(cookie);
                }
            }
            return unauthenticated(is_api, set);
        }
    };

    let mut refreshed = None;
    if needs_refresh(&session) {
        match (session.refresh_token.clone(), state.google.as_ref()) {
            (Some(refresh_token), Some(google)) => {
                let Some(tokens) = google.refresh_access_token(&refresh_token).await else {
                    info!("Ending session {} after failed token refresh", session.user.id);
                    return unauthenticated(is_api, state.sessions.delete());
                };

                session.access_token = Some(tokens.access_token);
                session.refresh_token = tokens.refresh_token;
                session.expires_at = tokens.expires_at;

                match state.sessions.create(&session) {
                    Ok(set) => refreshed = Some(set),
                    Err(e) => return AuthError::from(e).into_response(),
                }
            }
            _ if session.expires_at <= Utc::now().timestamp() => {
                warn!("Session {} expired without a refresh token", session.user.id);
                return unauthenticated(is_api, state.sessions.delete());
            }
            _ => {}
        }
    }

    req.extensions_mut().insert(CurrentSession(session));
    let response = next.run(req).await;

    match refreshed {
        Some(set) => (set, response).into_response(),
        None => response,
    }
}

/// Only addresses listed in `ADMIN_EMAILS` may manage the blacklist
pub fn require_admin(state: &AuthState, session: &SessionData) -> Result<(), AuthError> {
    let email = session.user.email.to_lowercase();
    if state.admin_emails.iter().any(|admin| *admin == email) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::tests::sample_session;
    use crate::tests::test_state;
    use axum::{
        Router,
        http::{StatusCode, header},
        middleware,
        routing::get,
    };
    use tower::ServiceExt;

    async fn whoami(CurrentSession(session): CurrentSession) -> String {
        session.user.email
    }

    fn app(state: AuthState) -> Router {
        Router::new()
            .route("/api/me", get(whoami))
            .route("/dashboard", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, require_session))
    }

    fn cookie_header(state: &AuthState, session: &SessionData) -> String {
        let set = state.sessions.create(session).unwrap();
        let token = set
            .cookies()
            .iter()
            .find(|c| c.name() == cookies::SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .unwrap();
        format!("session={}", token)
    }

    #[tokio::test]
    async fn test_api_without_session_is_401() {
        let response = app(test_state())
            .oneshot(Request::get("/api/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_page_without_session_redirects() {
        let response = app(test_state())
            .oneshot(Request::get("/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], LOGIN_PATH);
    }

    #[tokio::test]
    async fn test_valid_session_reaches_handler() {
        let state = test_state();
        let session = sample_session();
        let cookie = cookie_header(&state, &session);

        let response = app(state)
            .oneshot(
                Request::get("/api/me")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_expired_upstream_without_google_forces_logout() {
        let state = test_state();
        let mut session = sample_session();
        session.expires_at = Utc::now().timestamp() - 5;
        let cookie = cookie_header(&state, &session);

        let response = app(state)
            .oneshot(
                Request::get("/dashboard")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        assert!(set_cookies.iter().any(|c| c.starts_with("logout_flag=true")));
    }

    #[tokio::test]
    async fn test_require_admin_is_case_insensitive() {
        let mut state = test_state();
        state.admin_emails = std::sync::Arc::new(vec!["anna@example.com".to_string()]);
        let mut session = sample_session();
        session.user.email = "Anna@Example.com".to_string();

        assert!(require_admin(&state, &session).is_ok());
        session.user.email = "other@example.com".to_string();
        assert!(matches!(
            require_admin(&state, &session),
            Err(AuthError::Forbidden)
        ));
    }

    fn set_cookie_values(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_failed_refresh_deletes_session_and_redirects() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let mut state = test_state();
        state.google = Some(crate::oauth::tests::client_for(&server));
        let mut session = sample_session();
        session.expires_at = Utc::now().timestamp() + 100;
        let cookie = cookie_header(&state, &session);

        let response = app(state)
            .oneshot(
                Request::get("/dashboard")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], LOGIN_PATH);
        let set_cookies = set_cookie_values(&response);
        assert!(
            set_cookies
                .iter()
                .any(|c| c.starts_with("session=;") && c.contains("Max-Age=0"))
        );
        assert!(set_cookies.iter().any(|c| c.starts_with("logout_flag=true")));
    }

    #[tokio::test]
    async fn test_successful_refresh_reissues_session_cookie() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.fresh","expires_in":3600,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let mut state = test_state();
        state.google = Some(crate::oauth::tests::client_for(&server));
        let mut session = sample_session();
        session.expires_at = Utc::now().timestamp() + 100;
        let cookie = cookie_header(&state, &session);

        let response = app(state.clone())
            .oneshot(
                Request::get("/api/me")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let reissued = set_cookie_values(&response)
            .into_iter()
            .find_map(|c| {
                let pair = c.split(';').next()?.to_string();
                pair.strip_prefix("session=")
                    .filter(|token| !token.is_empty())
                    .map(|_| pair.clone())
            })
            .unwrap();

        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::COOKIE, reissued.parse().unwrap());
        let refreshed = state
            .sessions
            .validate_for_request(&headers)
            .await
            .into_session()
            .unwrap();
        assert_eq!(refreshed.user, session.user);
        assert_eq!(refreshed.access_token.as_deref(), Some("ya29.fresh"));
        assert_eq!(refreshed.refresh_token, session.refresh_token);
        assert!(refreshed.expires_at > Utc::now().timestamp() + 3500);
    }
}
