use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Time-ordered record of a scheduled retry, kept alongside the notification
/// row for observability. Markers carry no delivery semantics and are purged
/// by the daily cleanup task.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RetryMarker {
    /// Primary key (UUID)
    pub id: String,

    pub notification_id: String,

    /// Attempt count at the time the retry was scheduled.
    pub attempt: i32,

    /// Millisecond epoch when the retry becomes due.
    pub retry_at: i64,

    pub created_at: i64,
}
