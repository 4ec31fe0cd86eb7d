//! Generation history models

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A stored ad copy generation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt: serde_json::Value,
    pub result: String,
    pub tokens_used: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQuery {
    pub user_id: Uuid,
    pub prompt: serde_json::Value,
    pub result: String,
    pub tokens_used: i32,
}
