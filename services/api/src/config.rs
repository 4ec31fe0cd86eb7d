//! API service configuration loaded from environment variables

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

use crate::{
    billing::{
        tribute::{DEFAULT_TRIBUTE_API_URL, TributeConfig},
        yookassa::{DEFAULT_YOOKASSA_API_URL, YooKassaConfig},
    },
    generation::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL, GeneratorConfig},
    rate_limiter::RateLimiterConfig,
};

fn default_bind_address() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_tribute_api_url() -> String {
    DEFAULT_TRIBUTE_API_URL.to_string()
}

fn default_yookassa_api_url() -> String {
    DEFAULT_YOOKASSA_API_URL.to_string()
}

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_requests_per_minute() -> u32 {
    RateLimiterConfig::default().requests_per_minute
}

fn default_tokens_per_minute() -> u64 {
    RateLimiterConfig::default().tokens_per_minute
}

fn default_requests_per_hour() -> u32 {
    RateLimiterConfig::default().requests_per_hour
}

fn default_tokens_per_hour() -> u64 {
    RateLimiterConfig::default().tokens_per_hour
}

/// Top-level settings of the API binary.
///
/// Field names are the lower-cased environment variable names, so
/// `TRIBUTE_API_KEY` fills `tribute_api_key`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Public URL of the web app, used for provider return URLs
    #[serde(default = "default_app_url")]
    pub app_url: String,

    pub tribute_api_key: Option<String>,
    #[serde(default = "default_tribute_api_url")]
    pub tribute_api_url: String,
    pub tribute_webhook_secret: Option<String>,

    pub yookassa_shop_id: Option<String>,
    pub yookassa_secret_key: Option<String>,
    #[serde(default = "default_yookassa_api_url")]
    pub yookassa_api_url: String,

    #[serde(default = "default_requests_per_minute")]
    pub rate_limit_requests_per_minute: u32,
    #[serde(default = "default_tokens_per_minute")]
    pub rate_limit_tokens_per_minute: u64,
    #[serde(default = "default_requests_per_hour")]
    pub rate_limit_requests_per_hour: u32,
    #[serde(default = "default_tokens_per_hour")]
    pub rate_limit_tokens_per_hour: u64,

    pub openai_api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ApiConfig {
    /// Load the configuration from the process environment.
    ///
    /// Values are read as strings; only numeric fields are converted.
    pub fn from_env() -> Result<Self> {
        Config::builder()
            .add_source(Environment::default())
            .build()
            .context("Failed to read configuration from environment")?
            .try_deserialize()
            .context("Invalid API configuration")
    }

    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            requests_per_minute: self.rate_limit_requests_per_minute,
            tokens_per_minute: self.rate_limit_tokens_per_minute,
            requests_per_hour: self.rate_limit_requests_per_hour,
            tokens_per_hour: self.rate_limit_tokens_per_hour,
        }
    }

    pub fn tribute(&self) -> Option<TributeConfig> {
        Some(TributeConfig {
            api_url: self.tribute_api_url.clone(),
            api_key: non_empty(&self.tribute_api_key)?,
        })
    }

    pub fn yookassa(&self) -> Option<YooKassaConfig> {
        Some(YooKassaConfig {
            api_url: self.yookassa_api_url.clone(),
            shop_id: non_empty(&self.yookassa_shop_id)?,
            secret_key: non_empty(&self.yookassa_secret_key)?,
        })
    }

    pub fn generator(&self) -> Option<GeneratorConfig> {
        Some(GeneratorConfig {
            api_key: non_empty(&self.openai_api_key)?,
            base_url: self.openai_base_url.clone(),
            model: self.openai_model.clone(),
        })
    }

    /// Where processors send the user back after paying
    pub fn payment_return_url(&self) -> String {
        format!("{}/billing", self.app_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 7] = [
        "BIND_ADDRESS",
        "TRIBUTE_API_KEY",
        "TRIBUTE_WEBHOOK_SECRET",
        "YOOKASSA_SHOP_ID",
        "YOOKASSA_SECRET_KEY",
        "RATE_LIMIT_REQUESTS_PER_MINUTE",
        "OPENAI_API_KEY",
    ];

    fn clear() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3001");
        assert_eq!(config.rate_limiter(), RateLimiterConfig::default());
        assert!(config.tribute().is_none());
        assert!(config.yookassa().is_none());
        assert!(config.generator().is_none());
    }

    #[test]
    #[serial]
    fn test_reads_environment() {
        clear();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("TRIBUTE_API_KEY", "tribute-key");
            env::set_var("YOOKASSA_SHOP_ID", "123456");
            env::set_var("YOOKASSA_SECRET_KEY", "secret");
            env::set_var("RATE_LIMIT_REQUESTS_PER_MINUTE", "3");
        }

        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.rate_limiter().requests_per_minute, 3);
        assert_eq!(config.tribute().unwrap().api_key, "tribute-key");
        assert_eq!(config.yookassa().unwrap().shop_id, "123456");

        clear();
    }

    #[test]
    #[serial]
    fn test_digit_only_credentials_are_kept_verbatim() {
        clear();
        unsafe {
            env::set_var("TRIBUTE_WEBHOOK_SECRET", "0012345678901234567890123456789");
            env::set_var("YOOKASSA_SHOP_ID", "012345");
            env::set_var("YOOKASSA_SECRET_KEY", "000111");
        }

        let config = ApiConfig::from_env().unwrap();
        assert_eq!(
            config.tribute_webhook_secret.as_deref(),
            Some("0012345678901234567890123456789")
        );
        let yookassa = config.yookassa().unwrap();
        assert_eq!(yookassa.shop_id, "012345");
        assert_eq!(yookassa.secret_key, "000111");

        clear();
    }
}
