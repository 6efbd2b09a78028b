use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A dead-letter entry parking a notification that exhausted its retry
/// budget or hit a non-retryable provider error. At most one entry exists
/// per notification (unique index on `notification_id`).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DlqEntry {
    /// Primary key (UUID)
    pub id: String,

    pub notification_id: String,

    /// Short failure code, e.g. `max_retries_exceeded` or
    /// `non_retryable_provider_error`.
    pub failure_reason: String,

    /// Serialized [`RetryHistory`].
    pub retry_history: Option<String>,

    pub moved_to_dlq_at: i64,

    pub resolved: bool,

    pub resolved_at: Option<i64>,

    /// Operator id that resolved the entry, if any.
    pub resolved_by: Option<String>,
}

/// Snapshot of the retry trail at the moment a notification was parked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryHistory {
    pub total_attempts: i32,
    pub last_error: String,
    pub last_attempted_at: Option<i64>,
    pub failure_reason: String,
}

/// Aggregate counts over the dead-letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqStats {
    pub total: i64,
    pub unresolved: i64,
    pub resolved: i64,
}
