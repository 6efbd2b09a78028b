use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::RetryMarker;
use crate::db::now_ms;
use crate::error::{AppError, AppResult};

/// Repository for the time-ordered retry sidecar index.
pub struct RetryMarkerRepository;

impl RetryMarkerRepository {
    /// Record that a retry was scheduled for `retry_at`.
    pub async fn record(
        pool: &SqlitePool,
        notification_id: &str,
        attempt: i32,
        retry_at: i64,
    ) -> AppResult<RetryMarker> {
        sqlx::query_as::<_, RetryMarker>(
            r#"
            INSERT INTO retry_markers (id, notification_id, attempt, retry_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, notification_id, attempt, retry_at, created_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(notification_id)
        .bind(attempt)
        .bind(retry_at)
        .bind(now_ms())
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Markers due before `until`, soonest first. Observability only.
    pub async fn list_due(
        pool: &SqlitePool,
        until: i64,
        limit: i64,
    ) -> AppResult<Vec<RetryMarker>> {
        sqlx::query_as::<_, RetryMarker>(
            r#"
            SELECT id, notification_id, attempt, retry_at, created_at
            FROM retry_markers
            WHERE retry_at <= ?
            ORDER BY retry_at ASC
            LIMIT ?
            "#,
        )
        .bind(until)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Drop markers scheduled before the cutoff. Returns rows removed.
    pub async fn purge_older_than(pool: &SqlitePool, cutoff_ms: i64) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM retry_markers WHERE retry_at < ?")
            .bind(cutoff_ms)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::test_pool;

    #[tokio::test]
    async fn record_and_purge() {
        let pool = test_pool().await;
        let now = now_ms();

        RetryMarkerRepository::record(&pool, "n-1", 1, now - 10_000)
            .await
            .unwrap();
        RetryMarkerRepository::record(&pool, "n-1", 2, now + 10_000)
            .await
            .unwrap();

        let due = RetryMarkerRepository::list_due(&pool, now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempt, 1);

        let removed = RetryMarkerRepository::purge_older_than(&pool, now).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = RetryMarkerRepository::list_due(&pool, now + 60_000, 10)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].attempt, 2);
    }
}
