use sqlx::SqlitePool;

use crate::db::repository::{NotificationRepository, RetryMarkerRepository};
use crate::db::now_ms;
use crate::error::AppResult;
use crate::queue::{DeliveryQueue, Envelope};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Moves due scheduled/retry notifications from the store onto the
/// delivery queue. Only rows with an explicit `send_at` are swept;
/// immediate traffic was pushed at intake time.
pub struct Scheduler {
    pool: SqlitePool,
    queue: DeliveryQueue,
    batch_size: i64,
}

impl Scheduler {
    pub fn new(pool: SqlitePool, queue: DeliveryQueue, batch_size: i64) -> Self {
        Scheduler {
            pool,
            queue,
            batch_size,
        }
    }

    /// One sweep: enqueue every due PENDING row, bounded by the batch size.
    /// Push failures are logged and skipped; the row is still due, so the
    /// next sweep retries it. Returns the number of envelopes pushed.
    pub async fn enqueue_due(&self) -> AppResult<usize> {
        let due = NotificationRepository::find_due(&self.pool, now_ms(), self.batch_size).await?;
        if due.is_empty() {
            return Ok(0);
        }

        let mut pushed = 0;
        for notification in due {
            match self.queue.push(Envelope::send(notification.id.clone())) {
                Ok(()) => pushed += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to enqueue due notification {}: {}",
                        notification.id,
                        e
                    );
                }
            }
        }

        tracing::info!("Scheduler enqueued {} due notifications", pushed);
        Ok(pushed)
    }

    /// Daily maintenance: drop retry markers older than the retention
    /// window. Returns rows removed.
    pub async fn purge_old_retry_markers(&self, retention_days: i64) -> AppResult<u64> {
        let cutoff = now_ms() - retention_days * DAY_MS;
        let removed = RetryMarkerRepository::purge_older_than(&self.pool, cutoff).await?;
        if removed > 0 {
            tracing::info!(
                "Purged {} retry markers older than {}d",
                removed,
                retention_days
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::db::models::{CreateNotification, MessageType, ProviderType};
    use crate::db::testutil::test_pool;

    async fn seed_with_send_at(
        pool: &SqlitePool,
        key: &str,
        send_at: Option<i64>,
    ) -> String {
        NotificationRepository::create(
            pool,
            CreateNotification {
                user_id: "user-1".to_string(),
                idempotency_key: key.to_string(),
                message_type: MessageType::Sms,
                provider: ProviderType::ConsoleSms,
                payload: r#"{"to":"+15550100","body":"hi"}"#.to_string(),
                max_retries: 5,
                send_at,
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn sweep_enqueues_due_rows_only() {
        let pool = test_pool().await;
        let queue = DeliveryQueue::new();
        let scheduler = Scheduler::new(pool.clone(), queue.clone(), 100);
        let now = now_ms();

        let due = seed_with_send_at(&pool, "s-due", Some(now - 5000)).await;
        seed_with_send_at(&pool, "s-future", Some(now + 60_000)).await;
        seed_with_send_at(&pool, "s-immediate", None).await;

        let pushed = scheduler.enqueue_due().await.unwrap();
        assert_eq!(pushed, 1);

        let envelope = queue
            .pop_blocking(Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(envelope.id, due);
        assert!(queue.pop_blocking(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn cancelled_rows_are_never_enqueued() {
        let pool = test_pool().await;
        let queue = DeliveryQueue::new();
        let scheduler = Scheduler::new(pool.clone(), queue.clone(), 100);

        let id = seed_with_send_at(&pool, "s-cxl", Some(now_ms() + 60_000)).await;
        NotificationRepository::cancel(&pool, &id).await.unwrap();

        // Even once the deadline passes, the cancelled row stays out.
        sqlx::query("UPDATE notifications SET send_at = ? WHERE id = ?")
            .bind(now_ms() - 1000)
            .bind(&id)
            .execute(&pool)
            .await
            .unwrap();

        let pushed = scheduler.enqueue_due().await.unwrap();
        assert_eq!(pushed, 0);
        assert!(queue.pop_blocking(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn sweep_respects_the_batch_size() {
        let pool = test_pool().await;
        let queue = DeliveryQueue::new();
        let scheduler = Scheduler::new(pool.clone(), queue.clone(), 2);
        let now = now_ms();

        for i in 0..5 {
            seed_with_send_at(&pool, &format!("s-b{}", i), Some(now - 1000 - i)).await;
        }

        let pushed = scheduler.enqueue_due().await.unwrap();
        assert_eq!(pushed, 2);
    }

    #[tokio::test]
    async fn marker_purge_uses_retention_cutoff() {
        let pool = test_pool().await;
        let scheduler = Scheduler::new(pool.clone(), DeliveryQueue::new(), 100);
        let now = now_ms();

        RetryMarkerRepository::record(&pool, "n-1", 1, now - 8 * DAY_MS)
            .await
            .unwrap();
        RetryMarkerRepository::record(&pool, "n-1", 2, now - 1000)
            .await
            .unwrap();

        let removed = scheduler.purge_old_retry_markers(7).await.unwrap();
        assert_eq!(removed, 1);
    }
}
