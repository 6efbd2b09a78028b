pub mod models;
pub mod repository;

pub use models::*;
pub use repository::*;

/// Current time as a millisecond unix epoch. All persisted timestamps use
/// this representation.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
