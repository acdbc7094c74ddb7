//! Watermark store: the highest record id acknowledged per collection.
//!
//! Reads and writes never fail from the caller's point of view. A lost read degrades to 0
//! and a lost write only causes a transient re-notification.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::CollectionKind;

/// Key-value shim over the `watermarks` table.
///
/// Monotonicity is the caller's job: `set` persists whatever value it is given.
#[derive(Clone)]
pub struct WatermarkStore {
    pool: SqlitePool,
}

impl WatermarkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persisted watermark for `kind`, or 0 if never set or unreadable.
    pub async fn get(&self, kind: CollectionKind) -> i64 {
        match self.try_get(kind).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(%kind, "Failed to read watermark, using 0: {}", e);
                0
            }
        }
    }

    /// Persist `value` as the watermark for `kind`. Failures are logged and dropped.
    pub async fn set(&self, kind: CollectionKind, value: i64) {
        match self.try_set(kind, value).await {
            Ok(()) => tracing::debug!(%kind, value, "Watermark stored"),
            Err(e) => tracing::warn!(%kind, value, "Failed to store watermark: {}", e),
        }
    }

    async fn try_get(&self, kind: CollectionKind) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT value FROM watermarks WHERE key = ?")
            .bind(kind.storage_key())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(0);
        };

        let raw: String = row.get("value");
        let value = raw.trim().parse::<i64>().map_err(|e| {
            AppError::Database(format!(
                "Corrupt watermark {:?} for {}: {}",
                raw,
                kind.storage_key(),
                e
            ))
        })?;

        Ok(value.max(0))
    }

    async fn try_set(&self, kind: CollectionKind, value: i64) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO watermarks (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(kind.storage_key())
        .bind(value.to_string())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
