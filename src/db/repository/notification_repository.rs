use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{
    CreateNotification, DeadLetterEntry, Notification, STATUS_DEAD_LETTERED, STATUS_PENDING,
};
use crate::error::{AppError, AppResult};

/// Durable record of notifications. Claiming uses an atomic single-statement
/// `UPDATE ... WHERE id = (SELECT id ... LIMIT 1) RETURNING ...` per row,
/// avoiding a long-lived transaction; see `claim_due_pending`.
pub struct NotificationRepository;

impl NotificationRepository {
    pub async fn create(pool: &SqlitePool, input: CreateNotification) -> AppResult<Notification> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, Notification>(
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
        .bind(id)
        .bind(input.tenant_id)
        .bind(input.user_id)
        .bind(input.channel)
        .bind(input.payload)
        .bind(STATUS_PENDING)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn get(pool: &SqlitePool, id: &str) -> AppResult<Option<Notification>> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, tenant_id, user_id, channel, payload,
                   status, attempt, last_error, next_retry_at,
                   created_at, updated_at
            FROM notifications
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn list_by_tenant(
        pool: &SqlitePool,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, tenant_id, user_id, channel, payload,
                   status, attempt, last_error, next_retry_at,
                   created_at, updated_at
            FROM notifications
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

    /// Operator-facing status override. Does not enforce the worker's state
    /// machine beyond the caller-validated allow-list; callers are expected
    /// to have already rejected `dead_lettered` and negative attempts.
    pub async fn update_status(
        pool: &SqlitePool,
        id: &str,
        status: &str,
        attempt: i64,
        last_error: Option<String>,
        next_retry_at: Option<NaiveDateTime>,
    ) -> AppResult<Notification> {
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET status = ?, attempt = ?, last_error = ?, next_retry_at = ?, updated_at = ?
            WHERE id = ?
            RETURNING
                id, tenant_id, user_id, channel, payload,
                status, attempt, last_error, next_retry_at,
                created_at, updated_at
            "#,
        )
        .bind(status)
        .bind(attempt)
        .bind(last_error)
        .bind(next_retry_at)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Claim up to `limit` due pending notifications (`next_retry_at` null or
    /// past), ordered by creation time ascending. Not itself a lock — see the
    /// concurrency model for the duplicate-pickup discipline this implies
    /// when more than one worker is deployed.
    pub async fn claim_due_pending(
        pool: &SqlitePool,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let mut claimed = Vec::new();
        if limit <= 0 {
            return Ok(claimed);
        }

        for _ in 0..(limit as usize) {
            let now = Utc::now().naive_utc();

            let opt = sqlx::query_as::<_, Notification>(
                r#"
                UPDATE notifications
                SET status = 'processing', updated_at = ?
                WHERE id = (
                    SELECT id FROM notifications
                    WHERE status = 'pending'
                      AND (next_retry_at IS NULL OR next_retry_at <= ?)
                    ORDER BY created_at ASC
                    LIMIT 1
                )
                RETURNING
                    id, tenant_id, user_id, channel, payload,
                    status, attempt, last_error, next_retry_at,
                    created_at, updated_at
                "#,
            )
            .bind(now)
            .bind(now)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

            match opt {
                Some(row) => claimed.push(row),
                None => break,
            }
        }

        Ok(claimed)
    }

    /// Atomically insert a DLQ row and transition the notification to
    /// `dead_lettered`. Partial application is impossible: both statements
    /// run in the same transaction. `final_attempt` is the attempt count
    /// to persist on both rows — the caller's own increment of
    /// `notification.attempt`, not the stale pre-increment value, since a
    /// dead-letter is itself the outcome of that attempt.
    pub async fn move_to_dead_letter(
        pool: &SqlitePool,
        notification: &Notification,
        final_attempt: i64,
        err: &str,
    ) -> AppResult<DeadLetterEntry> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;
        let now = Utc::now().naive_utc();
        let dlq_id = Uuid::new_v4().to_string();

        let dlq_row = sqlx::query_as::<_, DeadLetterEntry>(
            r#"
            INSERT INTO dead_letter_entries (
                id, notification_id, tenant_id, user_id, channel, payload,
                attempts, last_error, dlq_status, retried_notification_id,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', NULL, ?, ?)
            RETURNING
                id, notification_id, tenant_id, user_id, channel, payload,
                attempts, last_error, dlq_status, retried_notification_id,
                created_at, updated_at
            "#,
        )
        .bind(&dlq_id)
        .bind(&notification.id)
        .bind(&notification.tenant_id)
        .bind(&notification.user_id)
        .bind(&notification.channel)
        .bind(&notification.payload)
        .bind(final_attempt)
        .bind(err)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        sqlx::query(
            r#"
            UPDATE notifications
            SET status = ?, attempt = ?, last_error = ?, next_retry_at = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(STATUS_DEAD_LETTERED)
        .bind(final_attempt)
        .bind(err)
        .bind(now)
        .bind(&notification.id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        Ok(dlq_row)
    }
}
