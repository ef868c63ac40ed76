use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{
    DeadLetterEntry, Notification, DLQ_STATUS_DISCARDED, DLQ_STATUS_PENDING, DLQ_STATUS_RETRIED,
    STATUS_PENDING,
};
use crate::error::{AppError, AppResult};

pub struct DlqRepository;

impl DlqRepository {
    pub async fn list_by_tenant(
        pool: &SqlitePool,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<DeadLetterEntry>> {
        let rows = sqlx::query_as::<_, DeadLetterEntry>(
            r#"
            SELECT id, notification_id, tenant_id, user_id, channel, payload,
                   attempts, last_error, dlq_status, retried_notification_id,
                   created_at, updated_at
            FROM dead_letter_entries
            WHERE tenant_id = ?
            ORDER BY created_at ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn get(pool: &SqlitePool, id: &str) -> AppResult<Option<DeadLetterEntry>> {
        let row = sqlx::query_as::<_, DeadLetterEntry>(
            r#"
            SELECT id, notification_id, tenant_id, user_id, channel, payload,
                   attempts, last_error, dlq_status, retried_notification_id,
                   created_at, updated_at
            FROM dead_letter_entries
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Atomically materialize a fresh pending notification from a DLQ row and
    /// mark the row `retried`. Fails with a conflict if `dlq_status` is not
    /// `pending` (not idempotent: a second call on the same id must fail).
    pub async fn retry_dlq(pool: &SqlitePool, id: &str) -> AppResult<Notification> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let entry = sqlx::query_as::<_, DeadLetterEntry>(
            r#"
            SELECT id, notification_id, tenant_id, user_id, channel, payload,
                   attempts, last_error, dlq_status, retried_notification_id,
                   created_at, updated_at
            FROM dead_letter_entries
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("dlq entry {id} not found")))?;

        if entry.dlq_status != DLQ_STATUS_PENDING {
            return Err(AppError::Conflict(format!(
                "dlq entry {id} is not pending (status: {})",
                entry.dlq_status
            )));
        }

        let new_id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (
                id, tenant_id, user_id, channel, payload,
                status, attempt, last_error, next_retry_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 0, NULL, NULL, ?, ?)
            RETURNING
                id, tenant_id, user_id, channel, payload,
                status, attempt, last_error, next_retry_at,
                created_at, updated_at
            "#,
        )
        .bind(&new_id)
        .bind(&entry.tenant_id)
        .bind(&entry.user_id)
        .bind(&entry.channel)
        .bind(&entry.payload)
        .bind(STATUS_PENDING)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        let updated = sqlx::query(
            r#"
            UPDATE dead_letter_entries
            SET dlq_status = ?, retried_notification_id = ?, updated_at = ?
            WHERE id = ? AND dlq_status = ?
            "#,
        )
        .bind(DLQ_STATUS_RETRIED)
        .bind(&new_id)
        .bind(now)
        .bind(id)
        .bind(DLQ_STATUS_PENDING)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        if updated.rows_affected() == 0 {
            // Lost a race against a concurrent retry/discard between the read above
            // and this write; roll back rather than leave two live notifications.
            return Err(AppError::Conflict(format!(
                "dlq entry {id} was concurrently updated"
            )));
        }

        tx.commit().await.map_err(AppError::Database)?;

        Ok(notification)
    }

    /// Conditional `pending -> discarded` update. Fails with a conflict if the
    /// entry is already `retried` or `discarded`.
    pub async fn discard_dlq(pool: &SqlitePool, id: &str) -> AppResult<DeadLetterEntry> {
        let now = Utc::now().naive_utc();

        let updated = sqlx::query(
            r#"
            UPDATE dead_letter_entries
            SET dlq_status = ?, updated_at = ?
            WHERE id = ? AND dlq_status = ?
            "#,
        )
        .bind(DLQ_STATUS_DISCARDED)
        .bind(now)
        .bind(id)
        .bind(DLQ_STATUS_PENDING)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        if updated.rows_affected() == 0 {
            let existing = Self::get(pool, id).await?;
            return match existing {
                Some(entry) => Err(AppError::Conflict(format!(
                    "dlq entry {id} is not pending (status: {})",
                    entry.dlq_status
                ))),
                None => Err(AppError::NotFound(format!("dlq entry {id} not found"))),
            };
        }

        Self::get(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("dlq entry {id} not found")))
    }
}
