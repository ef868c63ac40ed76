use serde::Serialize;

use crate::db::models::DeadLetterEntry;
use crate::db::repository::DlqRepository;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct DlqRetryOutcome {
    pub new_notification_id: String,
}

/// Thin delegation layer over `DlqRepository`; owns only not-found mapping
/// that the repository itself leaves to its caller.
pub struct DlqService {
    db: sqlx::SqlitePool,
}

impl DlqService {
    pub fn new(db: sqlx::SqlitePool) -> Self {
        Self { db }
    }

    pub async fn list_by_tenant(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<DeadLetterEntry>> {
        DlqRepository::list_by_tenant(&self.db, tenant_id, limit, offset).await
    }

    pub async fn get(&self, id: &str) -> AppResult<DeadLetterEntry> {
        DlqRepository::get(&self.db, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("dlq entry {id} not found")))
    }

    pub async fn retry(&self, id: &str) -> AppResult<DlqRetryOutcome> {
        let notification = DlqRepository::retry_dlq(&self.db, id).await?;
        Ok(DlqRetryOutcome {
            new_notification_id: notification.id,
        })
    }

    pub async fn discard(&self, id: &str) -> AppResult<DeadLetterEntry> {
        DlqRepository::discard_dlq(&self.db, id).await
    }
}
