//! Generation history repository

use common::error::DatabaseResult;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::models::{NewQuery, QueryRecord};

fn query_from_row(row: &PgRow) -> QueryRecord {
    QueryRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        prompt: row.get("prompt"),
        result: row.get("result"),
        tokens_used: row.get("tokens_used"),
        created_at: row.get("created_at"),
    }
}

#[derive(Clone)]
pub struct QueryRepository {
    pool: PgPool,
}

impl QueryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a finished generation
    pub async fn create(&self, query: &NewQuery) -> DatabaseResult<QueryRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO queries (id, user_id, prompt, result, tokens_used)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, prompt, result, tokens_used, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(query.user_id)
        .bind(&query.prompt)
        .bind(&query.result)
        .bind(query.tokens_used)
        .fetch_one(&self.pool)
        .await?;

        Ok(query_from_row(&row))
    }

    /// Most recent generations for a user, newest first
    pub async fn recent_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> DatabaseResult<Vec<QueryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, prompt, result, tokens_used, created_at
            FROM queries
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(query_from_row).collect())
    }
}
