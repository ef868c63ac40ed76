use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Semaphore};

use crate::channels::{Router, SendError};
use crate::config::RetryConfig;
use crate::db::models::{Notification, STATUS_PENDING, STATUS_SENT};
use crate::db::repository::NotificationRepository;
use crate::error::AppResult;

/// Deterministic, monotonic backoff keyed only by attempt number: attempt 1
/// -> 1 min, attempt 2 -> 5 min, attempt >= 3 -> 15 min.
pub fn backoff(attempt: i64) -> Duration {
    match attempt {
        a if a <= 1 => Duration::from_secs(60),
        2 => Duration::from_secs(5 * 60),
        _ => Duration::from_secs(15 * 60),
    }
}

/// Polls the Store for due work, invokes the Router, and applies
/// retry/dead-letter policy. One long-running loop per process; deploying
/// more than one strengthens `claim_due_pending`'s at-most-once guarantee
/// only if the implementer adds a conditional claim (see the concurrency
/// model) — this implementation relies on the state machine being
/// idempotent with respect to terminal states instead.
pub struct Worker {
    db: sqlx::SqlitePool,
    router: Arc<Router>,
    config: RetryConfig,
    concurrency: Arc<Semaphore>,
}

impl Worker {
    pub fn new(db: sqlx::SqlitePool, router: Arc<Router>, config: RetryConfig) -> Self {
        let concurrency = Arc::new(Semaphore::new(config.worker_concurrency.max(1) as usize));
        Self {
            db,
            router,
            config,
            concurrency,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                tracing::info!("worker received shutdown signal");
                break;
            }

            match NotificationRepository::claim_due_pending(
                &self.db,
                self.config.batch_size as i64,
            )
            .await
            {
                Ok(claimed) if claimed.is_empty() => {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            tracing::info!("worker shutting down");
                            break;
                        }
                        _ = tokio::time::sleep(Duration::from_secs(self.config.poll_interval_seconds)) => {}
                    }
                    continue;
                }
                Ok(claimed) => {
                    for notification in claimed {
                        if shutdown_rx.try_recv().is_ok() {
                            tracing::info!("skipping remaining claimed work due to shutdown");
                            break;
                        }
                        // Bounds the number of concurrently in-flight sends to
                        // `worker_concurrency`; blocks the poll loop (not the
                        // already-spawned tasks) once the permits are exhausted.
                        let permit = match self.concurrency.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };
                        let db = self.db.clone();
                        let router = self.router.clone();
                        let config = self.config.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            if let Err(e) = process_one(&db, &router, &config, notification).await
                            {
                                tracing::warn!(error = ?e, "failed to process claimed notification");
                            }
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "failed to claim due notifications");
                }
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("worker shutting down");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(self.config.poll_interval_seconds)) => {}
            }
        }
    }
}

async fn process_one(
    db: &sqlx::SqlitePool,
    router: &Router,
    config: &RetryConfig,
    notification: Notification,
) -> AppResult<()> {
    let new_attempt = notification.attempt + 1;

    match router.send(&notification).await {
        Ok(()) => {
            NotificationRepository::update_status(
                db,
                &notification.id,
                STATUS_SENT,
                new_attempt,
                None,
                None,
            )
            .await?;
        }
        Err(SendError::Routing) => {
            // Fatal for the notification: moves directly to dead-letter, no
            // retry loop required, but this is still the attempt that
            // produced the terminal outcome.
            NotificationRepository::move_to_dead_letter(
                db,
                &notification,
                new_attempt,
                "no sender supports this channel",
            )
            .await?;
        }
        Err(SendError::CircuitOpen) if !config.count_circuit_open_as_attempt => {
            // Defer without consuming an attempt so a brief provider outage
            // does not prematurely dead-letter traffic (see DESIGN.md).
            let next_retry_at = Utc::now().naive_utc()
                + chrono::Duration::seconds(config.poll_interval_seconds as i64);
            NotificationRepository::update_status(
                db,
                &notification.id,
                STATUS_PENDING,
                notification.attempt,
                Some("circuit open; deferred without consuming an attempt".to_string()),
                Some(next_retry_at),
            )
            .await?;
        }
        Err(e) => {
            let err_text = e.to_string();
            if new_attempt >= config.max_attempts as i64 {
                NotificationRepository::move_to_dead_letter(db, &notification, new_attempt, &err_text)
                    .await?;
            } else {
                let next_retry_at = Utc::now().naive_utc()
                    + chrono::Duration::from_std(backoff(new_attempt)).unwrap();
                NotificationRepository::update_status(
                    db,
                    &notification.id,
                    STATUS_PENDING,
                    new_attempt,
                    Some(err_text),
                    Some(next_retry_at),
                )
                .await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_is_deterministic_and_monotonic() {
        assert_eq!(backoff(1), Duration::from_secs(60));
        assert_eq!(backoff(2), Duration::from_secs(300));
        assert_eq!(backoff(3), Duration::from_secs(900));
        assert_eq!(backoff(10), Duration::from_secs(900));
        assert!(backoff(1) <= backoff(2));
        assert!(backoff(2) <= backoff(3));
    }
}
