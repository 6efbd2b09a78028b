use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

/// Delivery channel of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Email,
    Sms,
    Push,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Email => "EMAIL",
            MessageType::Sms => "SMS",
            MessageType::Push => "PUSH",
        }
    }

    /// Parse the canonical uppercase wire form. Anything else is rejected.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "EMAIL" => Ok(MessageType::Email),
            "SMS" => Ok(MessageType::Sms),
            "PUSH" => Ok(MessageType::Push),
            _ => Err(AppError::Validation(format!(
                "invalid message_type: {}",
                value
            ))),
        }
    }
}

/// Concrete transport used to deliver a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderType {
    Gmail,
    Outlook,
    CustomSmtp,
    Textbelt,
    ConsoleSms,
    Fcm,
    Local,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Gmail => "GMAIL",
            ProviderType::Outlook => "OUTLOOK",
            ProviderType::CustomSmtp => "CUSTOM_SMTP",
            ProviderType::Textbelt => "TEXTBELT",
            ProviderType::ConsoleSms => "CONSOLE_SMS",
            ProviderType::Fcm => "FCM",
            ProviderType::Local => "LOCAL",
        }
    }

    /// Parse the canonical uppercase wire form. Anything else is rejected.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "GMAIL" => Ok(ProviderType::Gmail),
            "OUTLOOK" => Ok(ProviderType::Outlook),
            "CUSTOM_SMTP" => Ok(ProviderType::CustomSmtp),
            "TEXTBELT" => Ok(ProviderType::Textbelt),
            "CONSOLE_SMS" => Ok(ProviderType::ConsoleSms),
            "FCM" => Ok(ProviderType::Fcm),
            "LOCAL" => Ok(ProviderType::Local),
            _ => Err(AppError::Validation(format!("invalid provider: {}", value))),
        }
    }
}

/// Lifecycle state of a notification. `Sent`, `Failed` and `Cancelled` are
/// terminal; only `Pending` rows are ever enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Failed => "FAILED",
            NotificationStatus::Cancelled => "CANCELLED",
        }
    }

    /// Parse the canonical uppercase wire form. Anything else is rejected.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "PENDING" => Ok(NotificationStatus::Pending),
            "SENT" => Ok(NotificationStatus::Sent),
            "FAILED" => Ok(NotificationStatus::Failed),
            "CANCELLED" => Ok(NotificationStatus::Cancelled),
            _ => Err(AppError::Validation(format!("invalid status: {}", value))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, NotificationStatus::Pending)
    }
}

/// A single intent to deliver one message to one user via one channel.
///
/// The row is created `PENDING` by intake and mutated only by the worker,
/// the retry engine, the DLQ manager, or an explicit cancel. All timestamps
/// are millisecond unix epochs.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    /// Primary key (UUID)
    pub id: String,

    /// Opaque identifier of the addressee.
    pub user_id: String,

    /// Unique per producer-intent string; second use within the reservation
    /// TTL is rejected, and the store's unique index is the hard guarantee.
    pub idempotency_key: String,

    pub message_type: MessageType,

    pub provider: ProviderType,

    pub status: NotificationStatus,

    /// Opaque textual blob; its shape is defined by the provider adapter.
    pub payload: String,

    /// Number of adapter calls already made for this notification.
    pub attempt_count: i32,

    /// Retry budget. `attempt_count` may reach `max_retries + 1` before the
    /// DLQ hand-off.
    pub max_retries: i32,

    pub created_at: i64,

    pub updated_at: i64,

    /// When `None` the notification is eligible immediately; otherwise it is
    /// not eligible until now >= send_at.
    pub send_at: Option<i64>,

    pub last_attempted_at: Option<i64>,

    pub sent_at: Option<i64>,

    pub failed_at: Option<i64>,

    /// Last provider error observed, if any.
    pub error_message: Option<String>,

    /// Last structured provider response, serialized as text.
    pub provider_response: Option<String>,
}

/// Data required to persist a new notification. `max_retries` and `send_at`
/// may be omitted and are defaulted by the intake service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub user_id: String,
    pub idempotency_key: String,
    pub message_type: MessageType,
    pub provider: ProviderType,
    pub payload: String,
    pub max_retries: i32,
    pub send_at: Option<i64>,
}
