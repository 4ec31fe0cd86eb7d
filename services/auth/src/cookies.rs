//! Cookie builders for the session, the logout flag and the OAuth handshake

use axum::{
    http::{HeaderValue, header::SET_COOKIE},
    response::{IntoResponseParts, ResponseParts},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use std::convert::Infallible;
use time::{Duration, OffsetDateTime};

pub const SESSION_COOKIE: &str = "session";
pub const LOGOUT_FLAG_COOKIE: &str = "logout_flag";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
pub const OAUTH_VERIFIER_COOKIE: &str = "oauth_pkce";

/// Seconds the logout flag suppresses session recognition
pub const LOGOUT_FLAG_TTL_SECONDS: i64 = 60;

const OAUTH_COOKIE_TTL_MINUTES: i64 = 10;

/// Ordered list of `Set-Cookie` directives attached to a response.
///
/// A cookie jar keys cookies by name, so it cannot emit several directives for
/// the same cookie. Logout needs exactly that.
#[derive(Debug, Default, Clone)]
pub struct SetCookies(Vec<Cookie<'static>>);

impl SetCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cookie: Cookie<'static>) {
        self.0.push(cookie);
    }

    pub fn extend(&mut self, other: SetCookies) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cookies(&self) -> &[Cookie<'static>] {
        &self.0
    }

    /// Header values in emission order
    pub fn header_values(&self) -> Vec<HeaderValue> {
        self.0
            .iter()
            .filter_map(|cookie| HeaderValue::from_str(&cookie.to_string()).ok())
            .collect()
    }
}

impl IntoResponseParts for SetCookies {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for value in self.header_values() {
            res.headers_mut().append(SET_COOKIE, value);
        }
        Ok(res)
    }
}

/// Create the session cookie.
pub fn session_cookie(token: String, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::seconds(max_age_seconds))
        .build()
}

/// Removal directives for the session cookie.
///
/// Browsers and proxies only drop a cookie when the removal matches the
/// attributes it was set with, so every plausible combination is sent.
pub fn clear_session_cookies(secure: bool) -> Vec<Cookie<'static>> {
    let expired = |cookie: Cookie<'static>| {
        let mut cookie = cookie;
        cookie.set_max_age(Duration::ZERO);
        cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
        cookie
    };

    let mut cookies = vec![
        expired(Cookie::build((SESSION_COOKIE, "")).path("/").build()),
        expired(
            Cookie::build((SESSION_COOKIE, ""))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .build(),
        ),
        expired(Cookie::build((SESSION_COOKIE, "")).build()),
    ];

    if secure {
        cookies.push(expired(
            Cookie::build((SESSION_COOKIE, ""))
                .path("/")
                .http_only(true)
                .secure(true)
                .same_site(SameSite::Lax)
                .build(),
        ));
    }

    cookies
}

/// The logout flag is readable by client scripts so cached UI state can react to it.
pub fn logout_flag_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((LOGOUT_FLAG_COOKIE, "true"))
        .http_only(false)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::seconds(LOGOUT_FLAG_TTL_SECONDS))
        .build()
}

pub fn clear_logout_flag_cookie() -> Cookie<'static> {
    Cookie::build((LOGOUT_FLAG_COOKIE, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// CSRF state and PKCE verifier cookies for the Google authorization request.
pub fn oauth_cookies(state: &str, verifier: &str, secure: bool) -> [Cookie<'static>; 2] {
    let build = |name: &'static str, value: &str| {
        Cookie::build((name, value.to_string()))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .path("/api/auth")
            .max_age(Duration::minutes(OAUTH_COOKIE_TTL_MINUTES))
            .build()
    };

    [
        build(OAUTH_STATE_COOKIE, state),
        build(OAUTH_VERIFIER_COOKIE, verifier),
    ]
}

pub fn clear_oauth_cookies() -> [Cookie<'static>; 2] {
    let clear = |name: &'static str| {
        Cookie::build((name, ""))
            .path("/api/auth")
            .max_age(Duration::ZERO)
            .build()
    };

    [clear(OAUTH_STATE_COOKIE), clear(OAUTH_VERIFIER_COOKIE)]
}
