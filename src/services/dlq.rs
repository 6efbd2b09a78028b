use sqlx::SqlitePool;

use crate::db::models::{DlqEntry, DlqStats, Notification};
use crate::db::repository::DlqRepository;
use crate::db::now_ms;
use crate::error::AppResult;

pub const REASON_NON_RETRYABLE: &str = "non_retryable_provider_error";
pub const REASON_UNCONFIGURED: &str = "provider_unconfigured";

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Out-of-range paging falls back to the defaults rather than erroring.
fn clamp_page(limit: i64, offset: i64) -> (i64, i64) {
    let limit = if limit <= 0 || limit > 100 { 20 } else { limit };
    let offset = offset.max(0);
    (limit, offset)
}

/// Operator-facing dead-letter queue manager: park, list, resolve,
/// resurrect, and age out failed notifications.
pub struct DlqService {
    pool: SqlitePool,
}

impl DlqService {
    pub fn new(pool: SqlitePool) -> Self {
        DlqService { pool }
    }

    /// Park a notification. Returns `None` when a concurrent cancel won the
    /// row first and nothing was parked.
    pub async fn move_to_dlq(
        &self,
        notification_id: &str,
        reason: &str,
        error_details: &str,
    ) -> AppResult<Option<DlqEntry>> {
        DlqRepository::move_to_dlq(&self.pool, notification_id, reason, error_details).await
    }

    /// Resurrect a parked notification to PENDING with a fresh budget and
    /// `send_at = now`; the scheduler picks it up on its next sweep.
    pub async fn retry_from_dlq(&self, dlq_id: &str) -> AppResult<Notification> {
        let notification = DlqRepository::retry_from_dlq(&self.pool, dlq_id).await?;
        tracing::info!(
            "DLQ entry {} resurrected notification {}",
            dlq_id,
            notification.id
        );
        Ok(notification)
    }

    pub async fn resolve(&self, dlq_id: &str, resolved_by: Option<&str>) -> AppResult<DlqEntry> {
        DlqRepository::resolve(&self.pool, dlq_id, resolved_by).await
    }

    pub async fn list(
        &self,
        resolved: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<DlqEntry>> {
        let (limit, offset) = clamp_page(limit, offset);
        DlqRepository::list(&self.pool, resolved, limit, offset).await
    }

    /// Delete resolved entries older than `days`. Returns rows removed.
    pub async fn cleanup_old(&self, days: i64) -> AppResult<u64> {
        let cutoff = now_ms() - days * DAY_MS;
        let removed = DlqRepository::cleanup_old(&self.pool, cutoff).await?;
        if removed > 0 {
            tracing::info!("Removed {} resolved DLQ entries older than {}d", removed, days);
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> AppResult<DlqStats> {
        DlqRepository::stats(&self.pool).await
    }

    /// Periodic alert hook: counts unresolved entries and warns when any
    /// need operator attention.
    pub async fn alert_unresolved(&self) -> AppResult<i64> {
        let unresolved = DlqRepository::count_unresolved(&self.pool).await?;
        if unresolved > 0 {
            tracing::warn!("{} notifications in DLQ need attention", unresolved);
        }
        Ok(unresolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_paging_falls_back_to_defaults() {
        assert_eq!(clamp_page(0, 0), (20, 0));
        assert_eq!(clamp_page(-5, -3), (20, 0));
        assert_eq!(clamp_page(101, 10), (20, 10));
        assert_eq!(clamp_page(100, 0), (100, 0));
        assert_eq!(clamp_page(1, 0), (1, 0));
    }
}
