use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single per-recipient notification moving through the delivery pipeline.
///
/// `status` follows the state machine owned by the Worker: `pending` ->
/// `processing` -> `sent`, with failure branches back to `pending` (with
/// `next_retry_at` set) or forward to `dead_lettered`. Once `sent` or
/// `dead_lettered`, the row is terminal and is never written to again.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub channel: String,
    /// Opaque per-channel payload document, stored as serialized JSON text.
    pub payload: String,
    pub status: String,
    pub attempt: i64,
    pub last_error: Option<String>,
    pub next_retry_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub tenant_id: String,
    pub user_id: String,
    pub channel: String,
    pub payload: String,
}

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SENT: &str = "sent";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_DEAD_LETTERED: &str = "dead_lettered";

/// Status values an operator may set via the status-override endpoint.
/// `dead_lettered` is deliberately excluded: that transition only ever
/// happens atomically alongside a DLQ row insert.
pub const OPERATOR_ALLOWED_STATUSES: &[&str] =
    &[STATUS_PENDING, STATUS_PROCESSING, STATUS_SENT, STATUS_FAILED];

pub const CHANNELS: &[&str] = &["email", "sms", "webhook"];
