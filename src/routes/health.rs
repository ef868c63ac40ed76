use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

pub async fn health_check() -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

/// Metrics collection is a boundary contract (see spec Out-of-scope): the
/// endpoint exists so operators can wire a scraper in front of it, but the
/// collector itself is not part of this core.
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        "# notifyhub metrics exposition is an external collaborator\n",
    )
}
