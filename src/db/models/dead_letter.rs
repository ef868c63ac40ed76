use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Terminal holding area for a notification that exhausted retries (or hit a
/// fatal routing error). Exists iff the referenced notification reached
/// terminal failure; `retried_notification_id` is set iff `dlq_status` is
/// `retried`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: String,
    pub notification_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub channel: String,
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub dlq_status: String,
    pub retried_notification_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

pub const DLQ_STATUS_PENDING: &str = "pending";
pub const DLQ_STATUS_RETRIED: &str = "retried";
pub const DLQ_STATUS_DISCARDED: &str = "discarded";
