use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{DlqEntry, DlqStats, Notification, RetryHistory};
use crate::db::now_ms;
use crate::error::{AppError, AppResult};

/// Repository for the dead-letter queue.
///
/// `move_to_dlq` and `retry_from_dlq` each run in a single transaction so
/// the DLQ entry and the notification row never disagree. The unique index
/// on `notification_id` rejects a second park of the same notification.
pub struct DlqRepository;

const DLQ_COLUMNS: &str = r#"
    id,
    notification_id,
    failure_reason,
    retry_history,
    moved_to_dlq_at,
    resolved,
    resolved_at,
    resolved_by
"#;

const NOTIFICATION_COLUMNS: &str = r#"
    id,
    user_id,
    idempotency_key,
    message_type,
    provider,
    status,
    payload,
    attempt_count,
    max_retries,
    created_at,
    updated_at,
    send_at,
    last_attempted_at,
    sent_at,
    failed_at,
    error_message,
    provider_response
"#;

impl DlqRepository {
    /// Park a notification: insert the DLQ entry and mark the row FAILED in
    /// one transaction. The FAILED transition is guarded on PENDING; when a
    /// concurrent cancel won the row first, the whole park rolls back and
    /// `None` is returned. A second park of the same notification rolls
    /// back and surfaces as an invalid transition.
    pub async fn move_to_dlq(
        pool: &SqlitePool,
        notification_id: &str,
        reason: &str,
        error_details: &str,
    ) -> AppResult<Option<DlqEntry>> {
        let now = now_ms();
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let select_sql = format!(
            "SELECT {} FROM notifications WHERE id = ?",
            NOTIFICATION_COLUMNS
        );
        let notification = sqlx::query_as::<_, Notification>(&select_sql)
            .bind(notification_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("notification not found".to_string()))?;

        let history = RetryHistory {
            total_attempts: notification.attempt_count,
            last_error: error_details.to_string(),
            last_attempted_at: notification.last_attempted_at,
            failure_reason: reason.to_string(),
        };
        let history_json = serde_json::to_string(&history)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let insert_sql = format!(
            r#"
            INSERT INTO notification_dlq (
                id,
                notification_id,
                failure_reason,
                retry_history,
                moved_to_dlq_at,
                resolved
            ) VALUES (?, ?, ?, ?, ?, 0)
            RETURNING {}
            "#,
            DLQ_COLUMNS
        );

        let entry = sqlx::query_as::<_, DlqEntry>(&insert_sql)
            .bind(Uuid::new_v4().to_string())
            .bind(notification_id)
            .bind(reason)
            .bind(history_json)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                let unique = e
                    .as_database_error()
                    .map(|db| db.message().contains("UNIQUE constraint failed"))
                    .unwrap_or(false);
                if unique {
                    AppError::InvalidTransition(
                        "notification already has a DLQ entry".to_string(),
                    )
                } else {
                    AppError::Database(e)
                }
            })?;

        let updated = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'FAILED', failed_at = ?, error_message = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(now)
        .bind(error_details)
        .bind(now)
        .bind(notification_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        if updated.rows_affected() == 0 {
            // Lost the race to a cancel; dropping the transaction rolls the
            // DLQ insert back.
            tracing::info!(
                "Notification {} left PENDING before DLQ park; dropping entry",
                notification_id
            );
            return Ok(None);
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(Some(entry))
    }

    /// Resurrect the parked notification: back to PENDING with a fresh
    /// retry budget and `send_at = now`. Rejected once the entry has been
    /// resolved.
    pub async fn retry_from_dlq(pool: &SqlitePool, dlq_id: &str) -> AppResult<Notification> {
        let now = now_ms();
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let entry_sql = format!("SELECT {} FROM notification_dlq WHERE id = ?", DLQ_COLUMNS);
        let entry = sqlx::query_as::<_, DlqEntry>(&entry_sql)
            .bind(dlq_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("DLQ entry not found".to_string()))?;

        if entry.resolved {
            return Err(AppError::InvalidTransition(
                "DLQ entry already resolved".to_string(),
            ));
        }

        let reset_sql = format!(
            r#"
            UPDATE notifications
            SET status = 'PENDING',
                attempt_count = 0,
                failed_at = NULL,
                error_message = NULL,
                send_at = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        );

        let notification = sqlx::query_as::<_, Notification>(&reset_sql)
            .bind(now)
            .bind(now)
            .bind(&entry.notification_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("notification not found".to_string()))?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(notification)
    }

    pub async fn resolve(
        pool: &SqlitePool,
        dlq_id: &str,
        resolved_by: Option<&str>,
    ) -> AppResult<DlqEntry> {
        let now = now_ms();
        let sql = format!(
            r#"
            UPDATE notification_dlq
            SET resolved = 1, resolved_at = ?, resolved_by = COALESCE(?, resolved_by)
            WHERE id = ?
            RETURNING {}
            "#,
            DLQ_COLUMNS
        );

        sqlx::query_as::<_, DlqEntry>(&sql)
            .bind(now)
            .bind(resolved_by)
            .bind(dlq_id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("DLQ entry not found".to_string()))
    }

    /// List entries, newest parked first. Paging bounds are validated by
    /// callers.
    pub async fn list(
        pool: &SqlitePool,
        resolved: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<DlqEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM notification_dlq
            WHERE (? IS NULL OR resolved = ?)
            ORDER BY moved_to_dlq_at DESC
            LIMIT ? OFFSET ?
            "#,
            DLQ_COLUMNS
        );

        sqlx::query_as::<_, DlqEntry>(&sql)
            .bind(resolved)
            .bind(resolved)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Delete resolved entries older than the cutoff. Returns the number of
    /// rows removed.
    pub async fn cleanup_old(pool: &SqlitePool, cutoff_ms: i64) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM notification_dlq WHERE resolved = 1 AND resolved_at < ?",
        )
        .bind(cutoff_ms)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    pub async fn count_unresolved(pool: &SqlitePool) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notification_dlq WHERE resolved = 0",
        )
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn stats(pool: &SqlitePool) -> AppResult<DlqStats> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notification_dlq")
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;
        let unresolved = Self::count_unresolved(pool).await?;

        Ok(DlqStats {
            total,
            unresolved,
            resolved: total - unresolved,
        })
    }
}
