use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::extract::AppQuery;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_dlq))
        .route("/:id", get(get_dlq))
        .route("/:id/retry", post(retry_dlq))
        .route("/:id/discard", post(discard_dlq))
}

/// `tenant_id` is required and must be a UUID; a missing or malformed value
/// is rejected by the `Query` extractor itself, surfaced as `AppError`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub tenant_id: Uuid,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn clamp_pagination(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.filter(|l| (1..=100).contains(l)).unwrap_or(20);
    let offset = offset.map(|o| o.max(0)).unwrap_or(0);
    (limit, offset)
}

async fn list_dlq(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let (limit, offset) = clamp_pagination(query.limit, query.offset);
    let entries = state
        .dlq
        .list_by_tenant(&query.tenant_id.to_string(), limit, offset)
        .await?;
    Ok(Json(entries))
}

async fn get_dlq(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let entry = state.dlq.get(&id).await?;
    Ok(Json(entry))
}

async fn retry_dlq(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.dlq.retry(&id).await?;
    Ok(Json(outcome))
}

async fn discard_dlq(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let entry = state.dlq.discard(&id).await?;
    Ok(Json(entry))
}
