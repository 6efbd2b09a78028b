use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateNotification, Notification, NotificationStatus};
use crate::db::now_ms;
use crate::error::{AppError, AppResult};

/// Repository for notification rows.
///
/// Implementation notes:
/// - State transitions that must not race (cancel, attempt claim) use a
///   single-statement conditional `UPDATE ... WHERE status = 'PENDING'
///   RETURNING ...`. This stands in for a row-level exclusive lock and
///   avoids long-lived transactions on SQLite.
/// - The unique index on `idempotency_key` is the hard duplicate guard;
///   violations are mapped to [`AppError::Duplicate`].
pub struct NotificationRepository;

const COLUMNS: &str = r#"
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

fn is_unique_violation(err: &sqlx::Error, needle: &str) -> bool {
    err.as_database_error()
        .map(|db| db.message().contains("UNIQUE constraint failed") && db.message().contains(needle))
        .unwrap_or(false)
}

impl NotificationRepository {
    /// Insert a new PENDING notification and return the stored row.
    pub async fn create(
        pool: &SqlitePool,
        data: CreateNotification,
    ) -> AppResult<Notification> {
        let id = Uuid::new_v4().to_string();
        let now = now_ms();

        let sql = format!(
            r#"
            INSERT INTO notifications (
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
                send_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            COLUMNS
        );

        sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .bind(data.user_id)
            .bind(data.idempotency_key)
            .bind(data.message_type)
            .bind(data.provider)
            .bind(NotificationStatus::Pending)
            .bind(data.payload)
            .bind(0i32)
            .bind(data.max_retries)
            .bind(now)
            .bind(now)
            .bind(data.send_at)
            .fetch_one(pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e, "idempotency_key") {
                    AppError::Duplicate
                } else {
                    AppError::Database(e)
                }
            })
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Notification>> {
        let sql = format!("SELECT {} FROM notifications WHERE id = ?", COLUMNS);

        sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// List notifications with optional user/status filters, newest first.
    /// Paging bounds are validated by callers.
    pub async fn list(
        pool: &SqlitePool,
        user_id: Option<&str>,
        status: Option<NotificationStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Notification>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE (? IS NULL OR user_id = ?)
              AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
            COLUMNS
        );

        sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(user_id)
            .bind(status)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Cancel a PENDING notification. The status guard in the UPDATE makes
    /// the check-and-set atomic with respect to concurrent worker pickup.
    pub async fn cancel(pool: &SqlitePool, id: &str) -> AppResult<Notification> {
        let now = now_ms();
        let sql = format!(
            r#"
            UPDATE notifications
            SET status = 'CANCELLED', failed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            RETURNING {}
            "#,
            COLUMNS
        );

        let updated = sqlx::query_as::<_, Notification>(&sql)
            .bind(now)
            .bind(now)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

        match updated {
            Some(n) => Ok(n),
            None => match Self::find_by_id(pool, id).await? {
                Some(_) => Err(AppError::InvalidTransition(
                    "only pending notifications can be cancelled".to_string(),
                )),
                None => Err(AppError::NotFound("notification not found".to_string())),
            },
        }
    }

    /// Record one delivery attempt: increments `attempt_count` and stamps
    /// `last_attempted_at`, but only while the row is still PENDING. Returns
    /// `None` when the notification was cancelled or completed in the
    /// meantime (at-least-once absorption).
    pub async fn claim_attempt(pool: &SqlitePool, id: &str) -> AppResult<Option<Notification>> {
        let now = now_ms();
        let sql = format!(
            r#"
            UPDATE notifications
            SET attempt_count = attempt_count + 1, last_attempted_at = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            RETURNING {}
            "#,
            COLUMNS
        );

        sqlx::query_as::<_, Notification>(&sql)
            .bind(now)
            .bind(now)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Terminal success transition. Guarded on PENDING so a cancel that won
    /// the row between the attempt claim and this commit stays terminal;
    /// the lost race surfaces as `None` and callers drop the result.
    pub async fn mark_sent(
        pool: &SqlitePool,
        id: &str,
        provider_response: Option<String>,
    ) -> AppResult<Option<Notification>> {
        let now = now_ms();
        let sql = format!(
            r#"
            UPDATE notifications
            SET status = 'SENT', sent_at = ?, provider_response = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            RETURNING {}
            "#,
            COLUMNS
        );

        sqlx::query_as::<_, Notification>(&sql)
            .bind(now)
            .bind(provider_response)
            .bind(now)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Push the row back to PENDING with a future `send_at` after a failed
    /// attempt. Guarded on PENDING like `mark_sent`: a concurrent cancel
    /// wins and the lost race surfaces as `None`. `last_attempted_at` is
    /// left alone; the worker is its sole writer.
    pub async fn schedule_retry(
        pool: &SqlitePool,
        id: &str,
        send_at: i64,
        error_message: &str,
    ) -> AppResult<Option<Notification>> {
        let now = now_ms();
        let sql = format!(
            r#"
            UPDATE notifications
            SET status = 'PENDING', send_at = ?, error_message = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            RETURNING {}
            "#,
            COLUMNS
        );

        sqlx::query_as::<_, Notification>(&sql)
            .bind(send_at)
            .bind(error_message)
            .bind(now)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Due scheduled/retry rows for the scheduler sweep, oldest deadline
    /// first. Immediate notifications carry `send_at = NULL` and are never
    /// returned here; they were pushed at intake time.
    pub async fn find_due(
        pool: &SqlitePool,
        now: i64,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE status = 'PENDING' AND send_at IS NOT NULL AND send_at <= ?
            ORDER BY send_at ASC
            LIMIT ?
            "#,
            COLUMNS
        );

        sqlx::query_as::<_, Notification>(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{MessageType, ProviderType};
    use crate::db::testutil::test_pool;

    fn sample(key: &str) -> CreateNotification {
        CreateNotification {
            user_id: "user-1".to_string(),
            idempotency_key: key.to_string(),
            message_type: MessageType::Email,
            provider: ProviderType::Local,
            payload: r#"{"to":"a@x","subject":"s","body":"b"}"#.to_string(),
            max_retries: 5,
            send_at: None,
        }
    }

    #[tokio::test]
    async fn create_persists_pending_row() {
        let pool = test_pool().await;
        let n = NotificationRepository::create(&pool, sample("k-1"))
            .await
            .unwrap();

        assert_eq!(n.status, NotificationStatus::Pending);
        assert_eq!(n.attempt_count, 0);
        assert_eq!(n.max_retries, 5);
        assert!(n.send_at.is_none());
        assert!(n.sent_at.is_none());

        let loaded = NotificationRepository::find_by_id(&pool, &n.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.idempotency_key, "k-1");
        assert_eq!(loaded.provider, ProviderType::Local);
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_rejected() {
        let pool = test_pool().await;
        NotificationRepository::create(&pool, sample("dup-1"))
            .await
            .unwrap();

        let err = NotificationRepository::create(&pool, sample("dup-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Duplicate));

        let rows = NotificationRepository::list(&pool, None, None, 20, 0)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn cancel_is_atomic_and_single_shot() {
        let pool = test_pool().await;
        let n = NotificationRepository::create(&pool, sample("k-c"))
            .await
            .unwrap();

        let cancelled = NotificationRepository::cancel(&pool, &n.id).await.unwrap();
        assert_eq!(cancelled.status, NotificationStatus::Cancelled);
        assert!(cancelled.failed_at.is_some());

        let err = NotificationRepository::cancel(&pool, &n.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        let err = NotificationRepository::cancel(&pool, "missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn claim_attempt_increments_and_respects_terminal_states() {
        let pool = test_pool().await;
        let n = NotificationRepository::create(&pool, sample("k-a"))
            .await
            .unwrap();

        let claimed = NotificationRepository::claim_attempt(&pool, &n.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.attempt_count, 1);
        assert!(claimed.last_attempted_at.is_some());

        NotificationRepository::cancel(&pool, &n.id).await.ok();
        // Cancelled row can no longer be claimed.
        let refused = NotificationRepository::claim_attempt(&pool, &n.id)
            .await
            .unwrap();
        assert!(refused.is_none());
    }

    #[tokio::test]
    async fn mark_sent_sets_terminal_fields() {
        let pool = test_pool().await;
        let n = NotificationRepository::create(&pool, sample("k-s"))
            .await
            .unwrap();

        let sent = NotificationRepository::mark_sent(&pool, &n.id, Some("{}".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.status, NotificationStatus::Sent);
        assert!(sent.sent_at.is_some());
        assert_eq!(sent.provider_response.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn terminal_transitions_lose_to_an_earlier_cancel() {
        let pool = test_pool().await;
        let n = NotificationRepository::create(&pool, sample("k-race"))
            .await
            .unwrap();
        NotificationRepository::claim_attempt(&pool, &n.id).await.unwrap();
        NotificationRepository::cancel(&pool, &n.id).await.unwrap();

        let sent = NotificationRepository::mark_sent(&pool, &n.id, None)
            .await
            .unwrap();
        assert!(sent.is_none());

        let retried =
            NotificationRepository::schedule_retry(&pool, &n.id, now_ms() + 1000, "err")
                .await
                .unwrap();
        assert!(retried.is_none());

        let n = NotificationRepository::find_by_id(&pool, &n.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.status, NotificationStatus::Cancelled);
        assert!(n.sent_at.is_none());
    }

    #[tokio::test]
    async fn find_due_only_returns_due_pending_rows() {
        let pool = test_pool().await;
        let now = now_ms();

        let mut due = sample("k-due");
        due.send_at = Some(now - 1000);
        let due = NotificationRepository::create(&pool, due).await.unwrap();

        let mut future = sample("k-future");
        future.send_at = Some(now + 60_000);
        NotificationRepository::create(&pool, future).await.unwrap();

        // Immediate rows (send_at NULL) are dispatched at intake, not here.
        NotificationRepository::create(&pool, sample("k-imm"))
            .await
            .unwrap();

        let mut cancelled = sample("k-cxl");
        cancelled.send_at = Some(now - 1000);
        let cancelled = NotificationRepository::create(&pool, cancelled).await.unwrap();
        NotificationRepository::cancel(&pool, &cancelled.id).await.unwrap();

        let found = NotificationRepository::find_due(&pool, now, 100).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn list_filters_by_user_and_status() {
        let pool = test_pool().await;
        let a = NotificationRepository::create(&pool, sample("k-l1"))
            .await
            .unwrap();
        let mut other = sample("k-l2");
        other.user_id = "user-2".to_string();
        NotificationRepository::create(&pool, other).await.unwrap();

        NotificationRepository::cancel(&pool, &a.id).await.unwrap();

        let cancelled = NotificationRepository::list(
            &pool,
            Some("user-1"),
            Some(NotificationStatus::Cancelled),
            20,
            0,
        )
        .await
        .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, a.id);

        let all = NotificationRepository::list(&pool, None, None, 20, 0)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
