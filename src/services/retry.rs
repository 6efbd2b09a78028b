use sqlx::SqlitePool;

use crate::config::RetryConfig;
use crate::db::repository::{DlqRepository, NotificationRepository, RetryMarkerRepository};
use crate::db::now_ms;
use crate::error::{AppError, AppResult};

pub const REASON_MAX_RETRIES: &str = "max_retries_exceeded";

/// Outcome of a retry decision for a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Another attempt was scheduled for `send_at`.
    Scheduled { send_at: i64 },
    /// The retry budget is exhausted; the notification was parked.
    MovedToDlq,
    /// The notification left PENDING concurrently (e.g. a cancel won the
    /// row); nothing was scheduled or parked.
    Dropped,
}

/// Computes capped exponential backoff and either reschedules a failed
/// notification or hands it to the DLQ once the budget is spent.
pub struct RetryEngine {
    pool: SqlitePool,
    config: RetryConfig,
}

/// Backoff curve without jitter: `min(base * exp_base^attempts, max)`.
/// `attempts` is the count already made.
fn capped_delay_ms(config: &RetryConfig, attempts: i32) -> f64 {
    let raw = config.base_delay_ms as f64 * config.exponential_base.powi(attempts);
    raw.min(config.max_delay_ms as f64)
}

/// Full backoff delay: the capped curve plus uniform jitter in
/// `[0, capped * 0.1)`, floored to whole milliseconds.
pub fn compute_delay_ms(config: &RetryConfig, attempts: i32) -> i64 {
    let capped = capped_delay_ms(config, attempts);
    let jitter = rand::random::<f64>() * capped * 0.1;
    (capped + jitter).floor() as i64
}

impl RetryEngine {
    pub fn new(pool: SqlitePool, config: RetryConfig) -> Self {
        RetryEngine { pool, config }
    }

    /// Decide the fate of a failed attempt. `attempts` is the post-increment
    /// attempt count from the worker's claim. The budget allows retries
    /// while `attempts <= max_retries`; one attempt beyond that parks the
    /// notification with reason `max_retries_exceeded`.
    pub async fn schedule_retry(
        &self,
        notification_id: &str,
        attempts: i32,
        error_message: &str,
    ) -> AppResult<RetryDecision> {
        if notification_id.is_empty() {
            return Err(AppError::Validation("notification id is missing".to_string()));
        }

        let notification = NotificationRepository::find_by_id(&self.pool, notification_id)
            .await?
            .ok_or_else(|| AppError::NotFound("notification not found".to_string()))?;

        if attempts > notification.max_retries {
            let details = if error_message.is_empty() {
                "max retry attempts exceeded"
            } else {
                error_message
            };
            let parked = DlqRepository::move_to_dlq(
                &self.pool,
                notification_id,
                REASON_MAX_RETRIES,
                details,
            )
            .await?;
            if parked.is_none() {
                return Ok(RetryDecision::Dropped);
            }
            tracing::warn!(
                "Notification {} moved to DLQ after {} attempts",
                notification_id,
                attempts
            );
            return Ok(RetryDecision::MovedToDlq);
        }

        let delay = compute_delay_ms(&self.config, attempts);
        let send_at = now_ms() + delay;

        let rescheduled = NotificationRepository::schedule_retry(
            &self.pool,
            notification_id,
            send_at,
            error_message,
        )
        .await?;
        if rescheduled.is_none() {
            tracing::info!(
                "Notification {} left PENDING before retry reschedule; dropping",
                notification_id
            );
            return Ok(RetryDecision::Dropped);
        }

        // Observability sidecar; a write failure must not lose the retry.
        if let Err(e) =
            RetryMarkerRepository::record(&self.pool, notification_id, attempts, send_at).await
        {
            tracing::warn!(
                "Failed to record retry marker for {}: {:?}",
                notification_id,
                e
            );
        }

        tracing::info!(
            "Notification {} retry {} scheduled in {}ms",
            notification_id,
            attempts,
            delay
        );
        Ok(RetryDecision::Scheduled { send_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        CreateNotification, MessageType, NotificationStatus, ProviderType,
    };
    use crate::db::testutil::test_pool;

    fn config() -> RetryConfig {
        RetryConfig {
            base_delay_ms: 1000,
            exponential_base: 2.0,
            max_delay_ms: 300_000,
            default_max_retries: 5,
        }
    }

    #[test]
    fn no_jitter_curve_is_monotonic_until_the_cap() {
        let cfg = config();
        let mut previous = 0.0;
        for attempts in 0..=12 {
            let delay = capped_delay_ms(&cfg, attempts);
            assert!(delay >= previous, "attempt {} regressed", attempts);
            previous = delay;
        }
    }

    #[test]
    fn curve_is_capped_at_max_delay() {
        let cfg = config();
        // 1000 * 2^10 = 1_024_000 > 300_000
        assert_eq!(capped_delay_ms(&cfg, 10), 300_000.0);
        assert_eq!(capped_delay_ms(&cfg, 20), 300_000.0);
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let cfg = config();
        for attempts in [0, 3, 9, 15] {
            let capped = capped_delay_ms(&cfg, attempts);
            for _ in 0..50 {
                let delay = compute_delay_ms(&cfg, attempts) as f64;
                assert!(delay >= capped.floor());
                assert!(delay <= capped * 1.1);
            }
        }
    }

    #[test]
    fn first_attempt_uses_doubled_base() {
        let cfg = config();
        // attempts = 1 after the first failed call: 1000 * 2^1.
        assert_eq!(capped_delay_ms(&cfg, 1), 2000.0);
    }

    async fn seed(pool: &sqlx::SqlitePool, key: &str, max_retries: i32) -> String {
        NotificationRepository::create(
            pool,
            CreateNotification {
                user_id: "user-1".to_string(),
                idempotency_key: key.to_string(),
                message_type: MessageType::Sms,
                provider: ProviderType::ConsoleSms,
                payload: r#"{"to":"+15550100","body":"hi"}"#.to_string(),
                max_retries,
                send_at: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn within_budget_schedules_a_future_attempt() {
        let pool = test_pool().await;
        let id = seed(&pool, "r-1", 2).await;
        let engine = RetryEngine::new(pool.clone(), config());

        let before = now_ms();
        let decision = engine.schedule_retry(&id, 1, "transient").await.unwrap();
        let send_at = match decision {
            RetryDecision::Scheduled { send_at } => send_at,
            other => panic!("expected schedule, got {:?}", other),
        };
        assert!(send_at >= before + 2000);

        let n = NotificationRepository::find_by_id(&pool, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.status, NotificationStatus::Pending);
        assert_eq!(n.send_at, Some(send_at));
        assert_eq!(n.error_message.as_deref(), Some("transient"));

        let markers = RetryMarkerRepository::list_due(&pool, send_at, 10)
            .await
            .unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].attempt, 1);
    }

    #[tokio::test]
    async fn budget_allows_attempts_up_to_max_retries() {
        let pool = test_pool().await;
        let id = seed(&pool, "r-2", 2).await;
        let engine = RetryEngine::new(pool.clone(), config());

        // Attempts 1 and 2 stay within a budget of 2.
        assert!(matches!(
            engine.schedule_retry(&id, 1, "e1").await.unwrap(),
            RetryDecision::Scheduled { .. }
        ));
        assert!(matches!(
            engine.schedule_retry(&id, 2, "e2").await.unwrap(),
            RetryDecision::Scheduled { .. }
        ));

        // The attempt beyond the budget parks the notification.
        assert_eq!(
            engine.schedule_retry(&id, 3, "e3").await.unwrap(),
            RetryDecision::MovedToDlq
        );
        let n = NotificationRepository::find_by_id(&pool, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.status, NotificationStatus::Failed);
        assert!(n.failed_at.is_some());
    }

    #[tokio::test]
    async fn zero_budget_parks_on_first_failure() {
        let pool = test_pool().await;
        let id = seed(&pool, "r-3", 0).await;
        let engine = RetryEngine::new(pool.clone(), config());

        assert_eq!(
            engine.schedule_retry(&id, 1, "boom").await.unwrap(),
            RetryDecision::MovedToDlq
        );
    }

    #[tokio::test]
    async fn cancelled_notification_is_dropped_not_rescheduled() {
        let pool = test_pool().await;
        let id = seed(&pool, "r-4", 2).await;
        NotificationRepository::claim_attempt(&pool, &id).await.unwrap();
        NotificationRepository::cancel(&pool, &id).await.unwrap();
        let engine = RetryEngine::new(pool.clone(), config());

        assert_eq!(
            engine.schedule_retry(&id, 1, "late failure").await.unwrap(),
            RetryDecision::Dropped
        );
        // Beyond the budget the park also loses to the cancel.
        assert_eq!(
            engine.schedule_retry(&id, 3, "late failure").await.unwrap(),
            RetryDecision::Dropped
        );

        let n = NotificationRepository::find_by_id(&pool, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.status, NotificationStatus::Cancelled);
    }

    #[tokio::test]
    async fn unknown_notification_is_not_found() {
        let pool = test_pool().await;
        let engine = RetryEngine::new(pool.clone(), config());
        let err = engine.schedule_retry("missing", 1, "x").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
