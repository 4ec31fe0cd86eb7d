//! Forced-logout blacklist
//!
//! Users listed here are treated as logged out no matter which session token
//! they present. The in-memory list is authoritative for the process
//! lifetime; the JSON file is a durability aid written after every change and
//! read once at startup. Concurrent writers in different processes race.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::jwt::SessionUser;

/// Blacklist configuration
#[derive(Debug, Clone, Default)]
pub struct BlacklistConfig {
    /// File the list is persisted to, if any
    pub file: Option<PathBuf>,
    /// JSON array used to seed the list when no file exists
    pub seed: Option<String>,
    /// Entries older than this many days are purged by the cleanup job
    pub max_age_days: Option<i64>,
}

impl BlacklistConfig {
    /// Create a new BlacklistConfig from environment variables
    ///
    /// # Environment Variables
    /// - `BLACKLIST_FILE`: path of the JSON store (default: unset, memory only)
    /// - `BLACKLIST_DATA`: JSON seed list
    /// - `BLACKLIST_MAX_AGE_DAYS`: age-based cleanup threshold (default: unset, disabled)
    pub fn from_env() -> Self {
        Self {
            file: std::env::var("BLACKLIST_FILE").ok().map(PathBuf::from),
            seed: std::env::var("BLACKLIST_DATA")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            max_age_days: std::env::var("BLACKLIST_MAX_AGE_DAYS")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

/// Fields identifying a blacklisted user; any single match is sufficient
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistCriteria {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl BlacklistCriteria {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && non_blank(&self.email).is_none() && non_blank(&self.name).is_none()
    }

    fn matches(&self, entry: &BlacklistEntry) -> bool {
        let id_match = matches!((self.id, entry.id), (Some(a), Some(b)) if a == b);
        id_match
            || fold_match(non_blank(&self.email), non_blank(&entry.email))
            || fold_match(non_blank(&self.name), non_blank(&entry.name))
    }
}

impl From<&SessionUser> for BlacklistCriteria {
    fn from(user: &SessionUser) -> Self {
        Self {
            id: Some(user.id),
            email: Some(user.email.clone()),
            name: Some(user.name.clone()),
        }
    }
}

/// A stored blacklist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistEntry {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "Utc::now")]
    pub blacklisted_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum BlacklistError {
    #[error("at least one of id, email or name is required")]
    EmptyCriteria,

    #[error("blacklist file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blacklist data is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn fold_match(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a.to_lowercase() == b.to_lowercase())
}

/// Process-wide blacklist, shared by cloning
#[derive(Debug, Clone, Default)]
pub struct BlacklistStore {
    entries: Arc<RwLock<Vec<BlacklistEntry>>>,
    file: Option<PathBuf>,
}

impl BlacklistStore {
    /// Memory-only store
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Build the store from config: the file wins when present, otherwise the seed is used.
    pub async fn load(config: &BlacklistConfig) -> Result<Self, BlacklistError> {
        let mut entries = Vec::new();

        match &config.file {
            Some(path) if tokio::fs::try_exists(path).await.unwrap_or(false) => {
                let raw = tokio::fs::read(path).await?;
                entries = serde_json::from_slice(&raw)?;
                info!(
                    "Loaded {} blacklist entries from {}",
                    entries.len(),
                    path.display()
                );
            }
            _ => {
                if let Some(seed) = &config.seed {
                    entries = serde_json::from_str(seed)?;
                    info!("Seeded {} blacklist entries from BLACKLIST_DATA", entries.len());
                }
            }
        }

        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
            file: config.file.clone(),
        })
    }

    /// Upsert: entries matching any criterion are replaced by one fresh entry.
    pub async fn add(
        &self,
        criteria: BlacklistCriteria,
        reason: Option<String>,
    ) -> Result<BlacklistEntry, BlacklistError> {
        if criteria.is_empty() {
            return Err(BlacklistError::EmptyCriteria);
        }

        let entry = BlacklistEntry {
            id: criteria.id,
            email: non_blank(&criteria.email).map(str::to_string),
            name: non_blank(&criteria.name).map(str::to_string),
            reason,
            blacklisted_at: Utc::now(),
        };

        {
            let mut entries = self.entries.write().await;
            entries.retain(|existing| !criteria.matches(existing));
            entries.push(entry.clone());
        }

        info!(
            "Blacklisted user (id: {:?}, email: {:?}, name: {:?})",
            entry.id, entry.email, entry.name
        );
        self.persist_logged().await;
        Ok(entry)
    }

    pub async fn is_blacklisted(&self, user: &SessionUser) -> bool {
        let criteria = BlacklistCriteria::from(user);
        self.entries
            .read()
            .await
            .iter()
            .any(|entry| criteria.matches(entry))
    }

    /// Returns whether anything was removed
    pub async fn remove(&self, criteria: &BlacklistCriteria) -> Result<bool, BlacklistError> {
        if criteria.is_empty() {
            return Err(BlacklistError::EmptyCriteria);
        }

        let removed = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|existing| !criteria.matches(existing));
            before != entries.len()
        };

        if removed {
            self.persist_logged().await;
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Vec<BlacklistEntry> {
        self.entries.read().await.clone()
    }

    /// Purge entries older than `days`; returns the count removed
    pub async fn clean_older_than(&self, days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(days);
        let removed = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|entry| entry.blacklisted_at >= cutoff);
            before - entries.len()
        };

        if removed > 0 {
            info!("Removed {} blacklist entries older than {} days", removed, days);
            self.persist_logged().await;
        }
        removed
    }

    /// Write the full list to the configured file
    pub async fn persist(&self) -> Result<(), BlacklistError> {
        let Some(path) = &self.file else {
            return Ok(());
        };

        let snapshot = self.list().await;
        let json = serde_json::to_vec_pretty(&snapshot)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            warn!("Failed to persist blacklist: {}", e);
        }
    }
}
