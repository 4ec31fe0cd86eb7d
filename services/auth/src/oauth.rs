//! Google OAuth2 integration
//!
//! Handles the authorization-code flow with PKCE for sign-in and the
//! refresh-token exchange that keeps upstream access tokens alive.

use anyhow::Result;
use chrono::Utc;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
    basic::BasicClient, reqwest::async_http_client,
};
use serde::Deserialize;
use tracing::{info, warn};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Fallback lifetime when the provider omits `expires_in`
const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 3600;

/// OAuth2 configuration for Google
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl GoogleOAuthConfig {
    /// Create a config with Google's public endpoints
    pub fn new(client_id: String, client_secret: String, redirect_url: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_url,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }

    /// Create a GoogleOAuthConfig from environment variables
    ///
    /// Returns `None` when Google sign-in is not configured.
    ///
    /// # Environment Variables
    /// - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`: OAuth client credentials
    /// - `GOOGLE_REDIRECT_URL`: callback URL (default: `$APP_URL/api/auth/google/callback`)
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID").ok()?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET").ok()?;
        let redirect_url = std::env::var("GOOGLE_REDIRECT_URL").unwrap_or_else(|_| {
            let app_url =
                std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
            format!(
                "{}/api/auth/google/callback",
                app_url.trim_end_matches('/')
            )
        });

        Some(Self::new(client_id, client_secret, redirect_url))
    }
}

/// Tokens issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry, epoch seconds
    pub expires_at: i64,
}

/// Google user profile
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub verified_email: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Google OAuth2 client
#[derive(Clone)]
pub struct GoogleOAuth {
    client: BasicClient,
    userinfo_url: String,
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(config: GoogleOAuthConfig) -> Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.client_id),
            Some(ClientSecret::new(config.client_secret)),
            AuthUrl::new(config.auth_url)?,
            Some(TokenUrl::new(config.token_url)?),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_url)?);

        Ok(Self {
            client,
            userinfo_url: config.userinfo_url,
            http: reqwest::Client::new(),
        })
    }

    /// Authorization URL plus the CSRF state and PKCE verifier to stash in cookies
    pub fn authorize_url(&self) -> (String, String, String) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        (
            url.to_string(),
            csrf_token.secret().clone(),
            pkce_verifier.secret().clone(),
        )
    }

    /// Exchange an authorization code for upstream tokens
    pub async fn exchange_code(&self, code: String, pkce_verifier: String) -> Result<UpstreamTokens> {
        info!("Exchanging Google authorization code");

        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
            .request_async(async_http_client)
            .await
            .map_err(|e| anyhow::anyhow!("Google code exchange failed: {}", e))?;

        Ok(UpstreamTokens {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_at: expiry_from(response.expires_in()),
        })
    }

    /// Exchange a refresh token for a fresh access token.
    ///
    /// Any failure yields `None`; the caller must then end the session.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Option<UpstreamTokens> {
        let response = match self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Google token refresh failed: {}", e);
                return None;
            }
        };

        Some(UpstreamTokens {
            access_token: response.access_token().secret().clone(),
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: expiry_from(response.expires_in()),
        })
    }

    /// Fetch the signed-in user's profile
    pub async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to get Google user profile: {}", response.status());
        }

        Ok(response.json().await?)
    }
}

fn expiry_from(expires_in: Option<std::time::Duration>) -> i64 {
    let ttl = expires_in
        .map(|d| d.as_secs() as i64)
        .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECONDS);
    Utc::now().timestamp() + ttl
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Client whose token and userinfo endpoints point at a mock server
    pub(crate) fn client_for(server: &mockito::ServerGuard) -> GoogleOAuth {
        let mut config = GoogleOAuthConfig::new(
            "client".to_string(),
            "secret".to_string(),
            "http://localhost:3000/api/auth/google/callback".to_string(),
        );
        config.token_url = format!("{}/token", server.url());
        config.userinfo_url = format!("{}/userinfo", server.url());
        GoogleOAuth::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_with_invalid_token_returns_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant","error_description":"Bad Request"}"#)
            .create_async()
            .await;

        let oauth = client_for(&server);
        assert!(oauth.refresh_access_token("revoked").await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.new","expires_in":3599,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let oauth = client_for(&server);
        let tokens = oauth.refresh_access_token("1//refresh").await.unwrap();

        assert_eq!(tokens.access_token, "ya29.new");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//refresh"));
        assert!(tokens.expires_at > Utc::now().timestamp() + 3500);
    }

    #[tokio::test]
    async fn test_fetch_profile() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/userinfo")
            .match_header("authorization", "Bearer ya29.token")
            .with_status(200)
            .with_body(
                r#"{"id":"1234","email":"anna@example.com","verified_email":true,"name":"Anna K"}"#,
            )
            .create_async()
            .await;

        let oauth = client_for(&server);
        let profile = oauth.fetch_profile("ya29.token").await.unwrap();
        assert_eq!(profile.id, "1234");
        assert_eq!(profile.name.as_deref(), Some("Anna K"));
        assert!(profile.picture.is_none());
    }

    #[test]
    fn test_authorize_url_carries_pkce_and_state() {
        let oauth = GoogleOAuth::new(GoogleOAuthConfig::new(
            "client".to_string(),
            "secret".to_string(),
            "http://localhost:3000/api/auth/google/callback".to_string(),
        ))
        .unwrap();

        let (url, state, verifier) = oauth.authorize_url();
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("code_challenge="));
        assert!(url.contains(&format!("state={}", state)));
        assert!(!verifier.is_empty());
    }
}
