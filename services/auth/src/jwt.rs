//! Session token signing and verification
//!
//! The session cookie carries an HS256 JWT whose claims embed the user
//! identity, the upstream identity-provider tokens and their expiry. Only a
//! holder of `JWT_SECRET` can mint or verify it.

use anyhow::Result;
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Minimum accepted length of the signing secret
pub const MIN_SECRET_LENGTH: usize = 32;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Symmetric signing secret
    pub secret: String,
}

impl JwtConfig {
    /// Build a config, rejecting secrets shorter than [`MIN_SECRET_LENGTH`]
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LENGTH {
            anyhow::bail!(
                "JWT_SECRET must be at least {} characters long",
                MIN_SECRET_LENGTH
            );
        }
        Ok(Self { secret })
    }

    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: HMAC secret for session tokens (required, at least 32 characters)
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;
        Self::new(secret)
    }
}

/// Identity embedded in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Payload of a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub user: SessionUser,
    /// Upstream identity-provider access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Upstream identity-provider refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry of the upstream access token, epoch seconds
    pub expires_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    #[serde(flatten)]
    session: SessionData,
    exp: i64,
}

/// Reasons a session token failed verification
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("session token expired")]
    Expired,

    /// Well-formed token signed with another key, usually a rotated `JWT_SECRET`
    #[error("session token signature does not match the current secret")]
    SignatureMismatch,

    #[error("session token is malformed: {0}")]
    Malformed(String),

    #[error("failed to sign session token: {0}")]
    Signing(String),
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    /// Sign a session valid for `ttl_seconds` from now
    pub fn sign(&self, session: &SessionData, ttl_seconds: i64) -> Result<String, TokenError> {
        self.sign_until(session, Utc::now().timestamp() + ttl_seconds)
    }

    pub(crate) fn sign_until(&self, session: &SessionData, exp: i64) -> Result<String, TokenError> {
        let claims = SessionClaims {
            session: session.clone(),
            exp,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and expiry, returning the embedded session
    pub fn verify(&self, token: &str) -> Result<SessionData, TokenError> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.session)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::SignatureMismatch,
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}
