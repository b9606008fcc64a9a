use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::services::cache::StoredEntry;

/// Open the SQLite pool backing the durable cache
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid database URL: {}", database_url))?
        .create_if_missing(true)
        // WAL keeps readers from blocking the writer
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect_with(connect_options)
        .await
        .context("Failed to open cache database")?;

    tracing::info!("SQLite cache database opened: WAL mode");

    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            ttl INTEGER NOT NULL,
            version TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_cache_entries_timestamp ON cache_entries(timestamp);
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create cache tables")?;

    Ok(())
}

pub async fn get_cache_entry(pool: &SqlitePool, key: &str) -> sqlx::Result<Option<StoredEntry>> {
    sqlx::query_as::<_, StoredEntry>(
        "SELECT key, data, timestamp, ttl, version FROM cache_entries WHERE key = ?",
    )
    .bind(key)
    .fetch_optional(pool)
    .await
}

/// Insert or overwrite the entry for its key
pub async fn put_cache_entry(pool: &SqlitePool, entry: &StoredEntry) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO cache_entries (key, data, timestamp, ttl, version) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&entry.key)
    .bind(&entry.data)
    .bind(entry.timestamp)
    .bind(entry.ttl)
    .bind(&entry.version)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_cache_entry(pool: &SqlitePool, key: &str) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn clear_cache_entries(pool: &SqlitePool) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM cache_entries")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn all_cache_entries(pool: &SqlitePool) -> sqlx::Result<Vec<StoredEntry>> {
    sqlx::query_as::<_, StoredEntry>(
        "SELECT key, data, timestamp, ttl, version FROM cache_entries ORDER BY timestamp",
    )
    .fetch_all(pool)
    .await
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // One connection, otherwise each connection gets its own in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
