//! Integration tests for the database layer
//!
//! These tests need a reachable PostgreSQL instance configured through
//! `DATABASE_URL`, so they are ignored by default.

use common::database::{DatabaseConfig, health_check, init_pool};
use sqlx::Row;

#[tokio::test]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_database_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    assert!(health_check(&pool).await, "Database health check failed");

    let row = sqlx::query("SELECT 1 as result").fetch_one(&pool).await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1);

    // Session-local temp table so nothing leaks between runs
    let mut conn = pool.acquire().await?;
    sqlx::query("CREATE TEMP TABLE adlab_scratch (id INT PRIMARY KEY, label TEXT NOT NULL)")
        .execute(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO adlab_scratch (id, label) VALUES ($1, $2)")
        .bind(1_i32)
        .bind("sample")
        .execute(&mut *conn)
        .await?;
    let label: String = sqlx::query_scalar("SELECT label FROM adlab_scratch WHERE id = $1")
        .bind(1_i32)
        .fetch_one(&mut *conn)
        .await?;
    assert_eq!(label, "sample");

    Ok(())
}
