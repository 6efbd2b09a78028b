use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::Notification;
use crate::error::AppResult;
use crate::services::intake::{CreateIntent, IntakeService};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_notification).get(list_notifications))
        .route("/bulk", post(bulk_create))
        .route(
            "/:id",
            get(get_notification).delete(cancel_notification),
        )
}

fn intake(state: &AppState) -> IntakeService {
    IntakeService::new(
        state.db.clone(),
        state.queue.clone(),
        state.idempotency.clone(),
        Duration::from_secs(state.config.idempotency.ttl_seconds),
        state.config.retry.default_max_retries,
    )
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: Option<String>,
    pub message_type: Option<String>,
    pub provider: Option<String>,
    /// Opaque payload; objects are stored as their compact JSON encoding.
    pub payload: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    pub send_at: Option<i64>,
    pub max_retries: Option<i32>,
}

impl CreateNotificationRequest {
    fn into_intent(self) -> CreateIntent {
        let payload = match self.payload {
            Some(serde_json::Value::String(s)) => s,
            Some(value) => value.to_string(),
            None => String::new(),
        };

        CreateIntent {
            user_id: self.user_id.unwrap_or_default(),
            message_type: self.message_type.unwrap_or_default(),
            provider: self.provider.unwrap_or_default(),
            payload,
            idempotency_key: self.idempotency_key,
            send_at: self.send_at,
            max_retries: self.max_retries,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BulkCreateItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateNotificationRequest>,
) -> AppResult<(StatusCode, Json<Notification>)> {
    let notification = intake(&state).create(request.into_intent()).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// Create many notifications in one call. Not atomic: each item succeeds or
/// fails independently and the response mirrors the input order.
async fn bulk_create(
    State(state): State<Arc<AppState>>,
    Json(requests): Json<Vec<CreateNotificationRequest>>,
) -> AppResult<(StatusCode, Json<Vec<BulkCreateItem>>)> {
    let intents = requests.into_iter().map(|r| r.into_intent()).collect();
    let results = intake(&state).bulk_create(intents).await;

    let items = results
        .into_iter()
        .map(|result| match result {
            Ok(notification) => BulkCreateItem {
                notification: Some(notification),
                error: None,
            },
            Err(e) => BulkCreateItem {
                notification: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok((StatusCode::CREATED, Json(items)))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Notification>> {
    let notification = intake(&state).get(&id).await?;
    Ok(Json(notification))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<Json<Vec<Notification>>> {
    let notifications = intake(&state)
        .list(
            query.user_id.as_deref(),
            query.status.as_deref(),
            query.limit.unwrap_or(20),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(notifications))
}

async fn cancel_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Notification>> {
    let notification = intake(&state).cancel(&id).await?;
    Ok(Json(notification))
}
