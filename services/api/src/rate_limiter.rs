//! Request and token rate limiter
//!
//! Two fixed windows, one minute and one hour, are kept per identifier. A
//! request passes only when both windows have room for it. A window resets
//! wholesale once its reset time is reached.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimiterConfig {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u64,
    pub requests_per_hour: u32,
    pub tokens_per_hour: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 10,
            tokens_per_minute: 10_000,
            requests_per_hour: 100,
            tokens_per_hour: 100_000,
        }
    }
}

/// Counters for one identifier in one window
#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    requests: u32,
    tokens: u64,
    reset_at: DateTime<Utc>,
}

/// Outcome of checking a single window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowCheck {
    allowed: bool,
    remaining_requests: u32,
    remaining_tokens: u64,
    reset_at: DateTime<Utc>,
}

#[derive(Debug)]
struct FixedWindow {
    length: Duration,
    max_requests: u32,
    max_tokens: u64,
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl FixedWindow {
    fn new(length: Duration, max_requests: u32, max_tokens: u64) -> Self {
        Self {
            length,
            max_requests,
            max_tokens,
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn try_consume(&self, key: &str, cost: u64, now: DateTime<Utc>) -> WindowCheck {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            requests: 0,
            tokens: 0,
            reset_at: now + self.length,
        });

        if now >= entry.reset_at {
            *entry = WindowEntry {
                requests: 0,
                tokens: 0,
                reset_at: now + self.length,
            };
        }

        let allowed = entry.requests < self.max_requests
            && entry.tokens.saturating_add(cost) <= self.max_tokens;
        if allowed {
            entry.requests += 1;
            entry.tokens += cost;
        }

        WindowCheck {
            allowed,
            remaining_requests: self.max_requests.saturating_sub(entry.requests),
            remaining_tokens: self.max_tokens.saturating_sub(entry.tokens),
            reset_at: entry.reset_at,
        }
    }

    /// Give back a consumption the other window refused
    async fn refund(&self, key: &str, cost: u64) {
        if let Some(entry) = self.entries.lock().await.get_mut(key) {
            entry.requests = entry.requests.saturating_sub(1);
            entry.tokens = entry.tokens.saturating_sub(cost);
        }
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.reset_at + self.length > now);
        before - entries.len()
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Tighter of the two windows' remaining request counts
    pub remaining_requests: u32,
    pub remaining_tokens: u64,
    /// When the caller may retry (on rejection) or when capacity next frees up
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.reset_at - now).num_seconds().max(1)
    }

    /// Human readable wait, e.g. "try again in 42 seconds"
    pub fn wait_message(&self, now: DateTime<Utc>) -> String {
        let seconds = self.retry_after_seconds(now);
        if seconds < 60 {
            format!("try again in {} seconds", seconds)
        } else {
            format!("try again in {} minutes", (seconds + 59) / 60)
        }
    }
}

/// Rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    minute: Arc<FixedWindow>,
    hour: Arc<FixedWindow>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            minute: Arc::new(FixedWindow::new(
                Duration::minutes(1),
                config.requests_per_minute,
                config.tokens_per_minute,
            )),
            hour: Arc::new(FixedWindow::new(
                Duration::hours(1),
                config.requests_per_hour,
                config.tokens_per_hour,
            )),
        }
    }

    /// Charge one request of `cost` tokens to `identifier`
    pub async fn check_limit(&self, identifier: &str, cost: u64) -> RateLimitDecision {
        self.check_limit_at(identifier, cost, Utc::now()).await
    }

    pub async fn check_limit_at(
        &self,
        identifier: &str,
        cost: u64,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let (minute, hour) = tokio::join!(
            self.minute.try_consume(identifier, cost, now),
            self.hour.try_consume(identifier, cost, now)
        );

        // A request counts against neither window unless both accept it
        if minute.allowed && !hour.allowed {
            self.minute.refund(identifier, cost).await;
        } else if hour.allowed && !minute.allowed {
            self.hour.refund(identifier, cost).await;
        }

        let allowed = minute.allowed && hour.allowed;
        let reset_at = match (minute.allowed, hour.allowed) {
            (false, true) => minute.reset_at,
            (true, false) => hour.reset_at,
            _ => minute.reset_at.min(hour.reset_at),
        };

        let decision = RateLimitDecision {
            allowed,
            remaining_requests: minute.remaining_requests.min(hour.remaining_requests),
            remaining_tokens: minute.remaining_tokens.min(hour.remaining_tokens),
            reset_at,
        };

        if !allowed {
            info!(
                "Rate limit exceeded for {} until {}",
                identifier, decision.reset_at
            );
        }
        decision
    }

    /// Drop windows that expired more than one window length ago
    pub async fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now()).await
    }

    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let (minute, hour) = tokio::join!(self.minute.cleanup(now), self.hour.cleanup(now));
        debug!("Rate limiter cleanup removed {} entries", minute + hour);
        minute + hour
    }

    /// Number of tracked identifier windows
    pub async fn tracked(&self) -> usize {
        self.minute.len().await + self.hour.len().await
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}
