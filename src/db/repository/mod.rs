pub mod dlq_repository;
pub mod notification_repository;
pub mod retry_marker_repository;

pub use dlq_repository::DlqRepository;
pub use notification_repository::NotificationRepository;
pub use retry_marker_repository::RetryMarkerRepository;
