use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository::NotificationRepository;
use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppQuery};
use crate::services::acceptance::{rate_limit_key, SubmitNotification};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(submit_notification).get(list_notifications))
        .route("/:id", get(get_notification))
        .route("/:id/status", patch(update_status))
}

/// `tenant_id` is required and must be a UUID; a missing or malformed value
/// is rejected by the `Query` extractor itself, surfaced as `AppError`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub tenant_id: Uuid,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub attempt: i64,
    pub error: Option<String>,
}

/// `limit` clamps to `[1, 100]` (default 20); `offset` clamps to `>= 0`.
fn clamp_pagination(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.filter(|l| (1..=100).contains(l)).unwrap_or(20);
    let offset = offset.map(|o| o.max(0)).unwrap_or(0);
    (limit, offset)
}

async fn submit_notification(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    headers: HeaderMap,
    AppJson(body): AppJson<SubmitNotification>,
) -> AppResult<Response> {
    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let header_tenant = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let tenant_for_key = header_tenant.as_deref().unwrap_or(&body.tenant_id);

    let key = rate_limit_key(Some(tenant_for_key), &addr.ip().to_string());
    let rate = state.acceptance.check_rate_limit(&key).await;

    if !rate.allow.allowed {
        return Err(AppError::Throttle {
            limit: rate.limit,
            remaining: rate.allow.remaining,
            reset_at: rate.allow.reset_at,
            retry_after: state.config.rate_limit.window_seconds,
        });
    }

    let accepted = state.acceptance.accept(body, idempotency_key).await?;

    let status = if accepted.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    let mut response = (status, Json(SubmitResponse { id: accepted.id })).into_response();
    let response_headers = response.headers_mut();
    insert_rate_limit_headers(response_headers, &rate);
    if accepted.replayed {
        response_headers.insert(
            HeaderName::from_static("x-idempotency-replayed"),
            HeaderValue::from_static("true"),
        );
    }

    Ok(response)
}

fn insert_rate_limit_headers(
    headers: &mut axum::http::HeaderMap,
    rate: &crate::services::acceptance::RateLimitOutcome,
) {
    if let Ok(v) = HeaderValue::from_str(&rate.limit.to_string()) {
        headers.insert(HeaderName::from_static("x-ratelimit-limit"), v);
    }
    if let Ok(v) = HeaderValue::from_str(&rate.allow.remaining.to_string()) {
        headers.insert(HeaderName::from_static("x-ratelimit-remaining"), v);
    }
    if let Ok(v) = HeaderValue::from_str(&rate.allow.reset_at.to_string()) {
        headers.insert(HeaderName::from_static("x-ratelimit-reset"), v);
    }
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let (limit, offset) = clamp_pagination(query.limit, query.offset);
    let notifications = NotificationRepository::list_by_tenant(
        &state.db,
        &query.tenant_id.to_string(),
        limit,
        offset,
    )
    .await?;
    Ok(Json(notifications))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let notification = NotificationRepository::get(&state.db, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;
    Ok(Json(notification))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(body): AppJson<UpdateStatusRequest>,
) -> AppResult<impl IntoResponse> {
    use crate::db::models::OPERATOR_ALLOWED_STATUSES;

    if !OPERATOR_ALLOWED_STATUSES.contains(&body.status.as_str()) {
        return Err(AppError::Validation(format!(
            "status must be one of {:?}",
            OPERATOR_ALLOWED_STATUSES
        )));
    }
    if body.attempt < 0 {
        return Err(AppError::Validation("attempt must be non-negative".to_string()));
    }

    let notification = NotificationRepository::update_status(
        &state.db,
        &id,
        &body.status,
        body.attempt,
        body.error,
        None,
    )
    .await?;

    Ok(Json(notification))
}
