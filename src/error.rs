use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error kinds recognised by the pipeline, per the error handling design:
/// each carries its own propagation policy (retried by the Worker, surfaced
/// to the caller, or fatal for the notification).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("rate limit exceeded")]
    Throttle {
        limit: u32,
        remaining: u32,
        reset_at: i64,
        retry_after: u64,
    },

    #[error("idempotency key currently in flight")]
    IdempotencyConflict,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Database(#[from] sqlx::Error),

    #[error("downstream request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("no sender supports this channel")]
    RoutingError,

    #[error("queue bridge enqueue failed: {0}")]
    BridgeError(String),

    #[error("request exceeded its timeout budget")]
    Timeout,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'static str,
    status: u16,
    detail: String,
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation", "Validation failed"),
            AppError::Throttle { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "throttle",
                "Rate limit exceeded",
            ),
            AppError::IdempotencyConflict => (
                StatusCode::CONFLICT,
                "idempotency-conflict",
                "Idempotency key currently in flight",
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not-found", "Resource not found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict", "Conflicting state"),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "store-unavailable",
                "Durable store unavailable",
            ),
            AppError::Request(_) => (
                StatusCode::BAD_GATEWAY,
                "provider-transient",
                "Downstream provider request failed",
            ),
            AppError::RoutingError => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "routing-error",
                "No sender supports this channel",
            ),
            AppError::BridgeError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "bridge-error",
                "Queue bridge enqueue failed",
            ),
            AppError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                "Request exceeded its timeout budget",
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal error",
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, title) = self.parts();

        let detail = match &self {
            AppError::Database(e) => {
                tracing::error!(error = ?e, "store unavailable");
                "A durable write or read failed".to_string()
            }
            AppError::Request(e) => {
                tracing::warn!(error = ?e, "downstream provider request failed");
                "The downstream provider request failed".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                "An internal error occurred".to_string()
            }
            AppError::BridgeError(msg) => {
                tracing::error!(detail = %msg, "queue bridge enqueue failed");
                "The queue bridge could not accept this notification".to_string()
            }
            _ => self.to_string(),
        };

        let body = ProblemDetails {
            kind,
            title,
            status: status.as_u16(),
            detail,
        };

        let mut response = (status, Json(body)).into_response();

        if let AppError::Throttle {
            limit,
            remaining,
            reset_at,
            retry_after,
        } = self
        {
            let headers = response.headers_mut();
            insert_header(headers, "x-ratelimit-limit", limit.to_string());
            insert_header(headers, "x-ratelimit-remaining", remaining.to_string());
            insert_header(headers, "x-ratelimit-reset", reset_at.to_string());
            insert_header(headers, "retry-after", retry_after.to_string());
        }

        response
    }
}

fn insert_header(headers: &mut axum::http::HeaderMap, name: &'static str, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

pub type AppResult<T> = Result<T, AppError>;
