use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::db::models::{DlqEntry, DlqStats, Notification};
use crate::error::AppResult;
use crate::services::dlq::DlqService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_entries))
        .route("/stats", get(stats))
        .route("/:id/retry", post(retry_entry))
        .route("/:id/resolve", post(resolve_entry))
}

#[derive(Debug, Deserialize)]
pub struct ListDlqQuery {
    pub resolved: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: Option<String>,
}

async fn list_entries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDlqQuery>,
) -> AppResult<Json<Vec<DlqEntry>>> {
    let entries = DlqService::new(state.db.clone())
        .list(
            query.resolved,
            query.limit.unwrap_or(20),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(entries))
}

async fn stats(State(state): State<Arc<AppState>>) -> AppResult<Json<DlqStats>> {
    let stats = DlqService::new(state.db.clone()).stats().await?;
    Ok(Json(stats))
}

/// Resurrect the parked notification behind a DLQ entry. Rejected once the
/// entry has been resolved.
async fn retry_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Notification>> {
    let notification = DlqService::new(state.db.clone()).retry_from_dlq(&id).await?;
    Ok(Json(notification))
}

async fn resolve_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<ResolveRequest>>,
) -> AppResult<Json<DlqEntry>> {
    let resolved_by = body.and_then(|Json(r)| r.resolved_by);
    let entry = DlqService::new(state.db.clone())
        .resolve(&id, resolved_by.as_deref())
        .await?;
    Ok(Json(entry))
}
