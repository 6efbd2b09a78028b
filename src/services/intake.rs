use std::time::Duration;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{
    CreateNotification, MessageType, Notification, NotificationStatus, ProviderType,
};
use crate::db::repository::NotificationRepository;
use crate::db::now_ms;
use crate::error::{AppError, AppResult};
use crate::idempotency::IdempotencyStore;
use crate::queue::{DeliveryQueue, Envelope};

/// Raw intent as submitted by a caller; enums arrive in their uppercase
/// wire form and are parsed here.
#[derive(Debug, Clone)]
pub struct CreateIntent {
    pub user_id: String,
    pub message_type: String,
    pub provider: String,
    pub payload: String,
    pub idempotency_key: Option<String>,
    pub send_at: Option<i64>,
    pub max_retries: Option<i32>,
}

/// Out-of-range paging falls back to the defaults rather than erroring.
fn clamp_page(limit: i64, offset: i64) -> (i64, i64) {
    let limit = if limit <= 0 || limit > 100 { 20 } else { limit };
    let offset = offset.max(0);
    (limit, offset)
}

/// Front door of the pipeline: validates intents, reserves idempotency,
/// persists PENDING rows, and pushes immediately-eligible notifications
/// onto the delivery queue.
pub struct IntakeService {
    pool: SqlitePool,
    queue: DeliveryQueue,
    idempotency: IdempotencyStore,
    idempotency_ttl: Duration,
    default_max_retries: i32,
}

impl IntakeService {
    pub fn new(
        pool: SqlitePool,
        queue: DeliveryQueue,
        idempotency: IdempotencyStore,
        idempotency_ttl: Duration,
        default_max_retries: i32,
    ) -> Self {
        IntakeService {
            pool,
            queue,
            idempotency,
            idempotency_ttl,
            default_max_retries,
        }
    }

    pub async fn create(&self, intent: CreateIntent) -> AppResult<Notification> {
        if intent.user_id.is_empty() || intent.payload.is_empty() {
            return Err(AppError::Validation(
                "user_id and payload are required".to_string(),
            ));
        }

        let message_type = MessageType::parse(&intent.message_type)?;
        let provider = ProviderType::parse(&intent.provider)?;

        let max_retries = intent.max_retries.unwrap_or(self.default_max_retries);
        if max_retries < 0 {
            return Err(AppError::Validation(
                "max_retries must be >= 0".to_string(),
            ));
        }

        let idempotency_key = intent
            .idempotency_key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Soft de-dupe window; the unique index on the row is the hard
        // guarantee and also catches keys reserved before a restart.
        if !self
            .idempotency
            .reserve(&idempotency_key, self.idempotency_ttl)
            .await
        {
            return Err(AppError::Duplicate);
        }

        let notification = NotificationRepository::create(
            &self.pool,
            CreateNotification {
                user_id: intent.user_id,
                idempotency_key,
                message_type,
                provider,
                payload: intent.payload,
                max_retries,
                send_at: intent.send_at,
            },
        )
        .await?;

        // Immediately eligible intents go straight to the queue; scheduled
        // ones wait for the scheduler sweep.
        let eligible_now = match notification.send_at {
            None => true,
            Some(send_at) => send_at <= now_ms(),
        };
        if eligible_now {
            self.queue.push(Envelope::send(notification.id.clone()))?;
            tracing::debug!("Notification {} enqueued for immediate send", notification.id);
        }

        Ok(notification)
    }

    /// Fold over `create`; not atomic across items. Each item succeeds or
    /// fails independently and keeps its input position in the result.
    pub async fn bulk_create(
        &self,
        intents: Vec<CreateIntent>,
    ) -> Vec<AppResult<Notification>> {
        let mut results = Vec::with_capacity(intents.len());
        for intent in intents {
            results.push(self.create(intent).await);
        }
        results
    }

    pub async fn get(&self, notification_id: &str) -> AppResult<Notification> {
        NotificationRepository::find_by_id(&self.pool, notification_id)
            .await?
            .ok_or_else(|| AppError::NotFound("notification not found".to_string()))
    }

    pub async fn list(
        &self,
        user_id: Option<&str>,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Notification>> {
        let status = match status {
            Some(s) => Some(NotificationStatus::parse(s)?),
            None => None,
        };
        let (limit, offset) = clamp_page(limit, offset);
        NotificationRepository::list(&self.pool, user_id, status, limit, offset).await
    }

    /// Cancel a PENDING notification; anything further along is an invalid
    /// transition. The repository guard makes this atomic against worker
    /// pickup.
    pub async fn cancel(&self, notification_id: &str) -> AppResult<Notification> {
        let cancelled = NotificationRepository::cancel(&self.pool, notification_id).await?;
        tracing::info!("Notification {} cancelled", notification_id);
        Ok(cancelled)
    }
}
