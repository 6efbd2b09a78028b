use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::db::repository::NotificationRepository;
use crate::error::AppResult;
use crate::providers::{ProviderRegistry, SendOutcome};
use crate::queue::Envelope;
use crate::services::dlq::{DlqService, REASON_NON_RETRYABLE, REASON_UNCONFIGURED};
use crate::services::retry::RetryEngine;

/// Processes one delivery envelope at a time: load, claim an attempt, call
/// the provider adapter under a wall-clock timeout, and convert the outcome
/// into a state transition.
///
/// The attempt claim and the terminal commit are separate small
/// transactions; no transaction is held across the adapter call. Errors
/// never escape the worker loop; they are logged and folded into retries.
pub struct DeliveryWorker {
    pool: SqlitePool,
    registry: Arc<ProviderRegistry>,
    retry: RetryEngine,
    dlq: DlqService,
    adapter_timeout: Duration,
}

impl DeliveryWorker {
    pub fn new(
        pool: SqlitePool,
        registry: Arc<ProviderRegistry>,
        retry: RetryEngine,
        adapter_timeout: Duration,
    ) -> Self {
        let dlq = DlqService::new(pool.clone());
        DeliveryWorker {
            pool,
            registry,
            retry,
            dlq,
            adapter_timeout,
        }
    }

    pub async fn process_envelope(&self, envelope: Envelope) -> AppResult<()> {
        if envelope.action != "send" {
            tracing::debug!(
                "Dropping envelope for {} with unknown action {}",
                envelope.id,
                envelope.action
            );
            return Ok(());
        }

        let notification = match NotificationRepository::find_by_id(&self.pool, &envelope.id).await?
        {
            Some(n) => n,
            None => {
                tracing::warn!("Notification {} not found; dropping envelope", envelope.id);
                return Ok(());
            }
        };

        // At-least-once absorption: duplicates of already-finished work are
        // a no-op.
        if notification.status.is_terminal() {
            tracing::info!(
                "Notification {} already {}; dropping envelope",
                notification.id,
                notification.status.as_str()
            );
            return Ok(());
        }

        // Claim the attempt. Losing the race (e.g. a concurrent cancel)
        // means there is nothing left to do.
        let notification = match NotificationRepository::claim_attempt(&self.pool, &envelope.id)
            .await?
        {
            Some(n) => n,
            None => {
                tracing::info!(
                    "Notification {} left PENDING before attempt claim; dropping envelope",
                    envelope.id
                );
                return Ok(());
            }
        };
        let attempts = notification.attempt_count;

        let adapter = match self.registry.get(notification.provider) {
            Some(adapter) => adapter,
            None => {
                tracing::error!(
                    "No adapter configured for provider {}; parking notification {}",
                    notification.provider.as_str(),
                    notification.id
                );
                self.dlq
                    .move_to_dlq(
                        &notification.id,
                        REASON_UNCONFIGURED,
                        &format!(
                            "no adapter configured for provider {}",
                            notification.provider.as_str()
                        ),
                    )
                    .await?;
                return Ok(());
            }
        };

        tracing::debug!(
            "Dispatching notification {} attempt {} via {}",
            notification.id,
            attempts,
            adapter.name()
        );

        let outcome = match tokio::time::timeout(self.adapter_timeout, adapter.send(&notification))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => SendOutcome::failure(format!(
                "timeout: adapter {} exceeded {}s",
                adapter.name(),
                self.adapter_timeout.as_secs()
            )),
        };

        if outcome.success {
            let provider_response = outcome.response.map(|v| v.to_string());
            match NotificationRepository::mark_sent(
                &self.pool,
                &notification.id,
                provider_response,
            )
            .await?
            {
                Some(_) => tracing::info!(
                    "Notification {} sent via {} on attempt {}",
                    notification.id,
                    adapter.name(),
                    attempts
                ),
                // A cancel won the row mid-send; its terminal state stands.
                None => tracing::info!(
                    "Notification {} left PENDING before terminal commit; dropping result",
                    notification.id
                ),
            }
            return Ok(());
        }

        if !outcome.retryable {
            tracing::error!(
                "Notification {} failed non-retryably: {}",
                notification.id,
                outcome.message
            );
            self.dlq
                .move_to_dlq(&notification.id, REASON_NON_RETRYABLE, &outcome.message)
                .await?;
            return Ok(());
        }

        tracing::warn!(
            "Notification {} attempt {} failed: {}",
            notification.id,
            attempts,
            outcome.message
        );
        self.retry
            .schedule_retry(&notification.id, attempts, &outcome.message)
            .await?;
        Ok(())
    }
}
