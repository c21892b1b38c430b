//! # Settings Repository
//!
//! Row-level access to the `settings` table.
//!
//! ## Save Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   replace_all(entries) - ONE TRANSACTION                │
//! │                                                                         │
//! │  1. DELETE FROM settings                                               │
//! │  2. INSERT INTO settings (key, value, updated_at) ... × N              │
//! │  3. COMMIT                                                             │
//! │                                                                         │
//! │  Removed keys (restored history blobs, cleared name overrides) vanish  │
//! │  without tracking individual deletes. A failed save leaves the         │
//! │  previous snapshot untouched.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Repository for settings rows.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Returns every row as `(key, value)`, ordered by key.
    pub async fn load_all(&self) -> StoreResult<Vec<(String, String)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings ORDER BY key")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    /// Returns the value for one key.
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Inserts or replaces one row.
    pub async fn upsert(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes one row. Returns true if a row was removed.
    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM settings WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replaces the whole table with `entries` in one transaction.
    pub async fn replace_all(&self, entries: &[(String, String)]) -> StoreResult<()> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;

        sqlx::query("DELETE FROM settings").execute(&mut *tx).await?;

        for (key, value) in entries {
            sqlx::query("INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)")
                .bind(key)
                .bind(value)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;

        debug!(count = entries.len(), "Settings snapshot written");
        Ok(())
    }

    /// Returns the number of rows.
    pub async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
