use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::cache::idempotency::{check_or_reserve_best_effort, IdempotencyCache, IdempotencyOutcome, ReserveResult};
use crate::cache::rate_limiter::{allow_best_effort, AllowResult, RateLimiter};
use crate::config::{IdempotencyConfig, RateLimitConfig};
use crate::db::models::{CreateNotification, CHANNELS};
use crate::db::repository::NotificationRepository;
use crate::error::{AppError, AppResult};
use crate::services::queue_bridge::QueueBridge;

#[derive(Debug, Deserialize)]
pub struct SubmitNotification {
    pub tenant_id: String,
    pub user_id: String,
    pub channel: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedNotification {
    pub id: String,
    /// `true` when this response replays a prior idempotent acceptance
    /// rather than recording a new notification.
    pub replayed: bool,
}

pub struct RateLimitOutcome {
    pub allow: AllowResult,
    pub limit: u32,
}

/// Validates, rate-limits, de-duplicates, and persists an incoming
/// submission. Mirrors the contract order: validate, rate-limit, idempotency,
/// persist, store idempotency outcome, optionally enqueue.
pub struct AcceptanceService {
    db: sqlx::SqlitePool,
    idempotency: Option<Arc<IdempotencyCache>>,
    idempotency_config: IdempotencyConfig,
    rate_limiter: Option<Arc<RateLimiter>>,
    rate_limit_config: RateLimitConfig,
    queue_bridge: Arc<dyn QueueBridge>,
}

impl AcceptanceService {
    pub fn new(
        db: sqlx::SqlitePool,
        idempotency: Option<Arc<IdempotencyCache>>,
        idempotency_config: IdempotencyConfig,
        rate_limiter: Option<Arc<RateLimiter>>,
        rate_limit_config: RateLimitConfig,
        queue_bridge: Arc<dyn QueueBridge>,
    ) -> Self {
        Self {
            db,
            idempotency,
            idempotency_config,
            rate_limiter,
            rate_limit_config,
            queue_bridge,
        }
    }

    /// Checks the sliding-window admission control for `rate_limit_key`.
    /// Returns the full accounting so the caller can set response headers
    /// on both the success and throttle paths.
    pub async fn check_rate_limit(&self, rate_limit_key: &str) -> RateLimitOutcome {
        let allow = allow_best_effort(
            self.rate_limiter.as_deref(),
            rate_limit_key,
            1,
            self.rate_limit_config.limit_per_window,
        )
        .await;
        RateLimitOutcome {
            allow,
            limit: self.rate_limit_config.limit_per_window,
        }
    }

    pub async fn accept(
        &self,
        submission: SubmitNotification,
        idempotency_key: Option<String>,
    ) -> AppResult<AcceptedNotification> {
        validate_envelope(&submission)?;

        // A caller-supplied key gets the long TTL; absent one, fall back to
        // a content hash of the envelope with the short TTL (still prevents
        // an exact-duplicate resubmission from producing two records).
        let (effective_key, outcome_ttl) = match &idempotency_key {
            Some(key) => (key.clone(), self.idempotency_config.caller_key_ttl_seconds),
            None => (
                content_hash_key(&submission),
                self.idempotency_config.content_hash_ttl_seconds,
            ),
        };

        let reserve_result = check_or_reserve_best_effort(
            self.idempotency.as_deref(),
            &submission.tenant_id,
            Some(effective_key.as_str()),
            self.idempotency_config.reservation_ttl_seconds,
        )
        .await;

        match reserve_result {
            Some(ReserveResult::Cached(outcome)) => {
                return Ok(AcceptedNotification {
                    id: outcome.notification_id,
                    replayed: true,
                });
            }
            Some(ReserveResult::DuplicateInFlight) => {
                return Err(AppError::IdempotencyConflict);
            }
            Some(ReserveResult::Reserved) | None => {}
        }

        let notification = NotificationRepository::create(
            &self.db,
            CreateNotification {
                tenant_id: submission.tenant_id.clone(),
                user_id: submission.user_id,
                channel: submission.channel,
                payload: submission.payload.to_string(),
            },
        )
        .await?;

        if matches!(reserve_result, Some(ReserveResult::Reserved)) {
            if let Some(cache) = &self.idempotency {
                let outcome = IdempotencyOutcome {
                    notification_id: notification.id.clone(),
                    status_code: 201,
                };
                if let Err(e) = cache
                    .store(&submission.tenant_id, &effective_key, &outcome, outcome_ttl)
                    .await
                {
                    tracing::warn!(error = ?e, "failed to persist idempotency outcome");
                }
            }
        }

        // Acceptance is not considered complete until the enqueue returns,
        // when the bridge is active, to preserve the at-most-once-on-retry
        // guarantee. The notification row is left visible to the Worker on
        // failure rather than rolled back (see DESIGN.md).
        self.queue_bridge
            .enqueue(&notification)
            .await
            .map_err(AppError::BridgeError)?;

        Ok(AcceptedNotification {
            id: notification.id,
            replayed: false,
        })
    }
}

/// Derives a stable idempotency key from the envelope's content when the
/// caller supplied none, so an exact-duplicate resubmission within the short
/// TTL still collapses to one notification.
fn content_hash_key(submission: &SubmitNotification) -> String {
    let mut hasher = Sha256::new();
    hasher.update(submission.tenant_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(submission.user_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(submission.channel.as_bytes());
    hasher.update(b"\0");
    hasher.update(submission.payload.to_string().as_bytes());
    format!("content:{}", hex::encode(hasher.finalize()))
}

fn validate_envelope(submission: &SubmitNotification) -> AppResult<()> {
    if submission.tenant_id.trim().is_empty() {
        return Err(AppError::Validation("tenant_id must be non-empty".to_string()));
    }
    if submission.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id must be non-empty".to_string()));
    }
    if !CHANNELS.contains(&submission.channel.as_str()) {
        return Err(AppError::Validation(format!(
            "unknown channel tag: {}",
            submission.channel
        )));
    }
    if !submission.payload.is_object() {
        return Err(AppError::Validation(
            "payload must be a JSON object".to_string(),
        ));
    }
    Ok(())
}

/// Derives the rate-limit key per the preferred-then-fallback contract:
/// `tenant:<id>` when a tenant identifier is known, else `ip:<addr>`.
pub fn rate_limit_key(tenant_id: Option<&str>, client_ip: &str) -> String {
    match tenant_id {
        Some(tenant_id) if !tenant_id.trim().is_empty() => format!("tenant:{tenant_id}"),
        _ => format!("ip:{client_ip}"),
    }
}

/// A fresh idempotency key, used when no `Idempotency-Key` header is
/// supplied but the caller still wants a unique request identifier for
/// tracing (not for deduplication).
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_channel_is_rejected() {
        let submission = SubmitNotification {
            tenant_id: "t1".to_string(),
            user_id: "u1".to_string(),
            channel: "carrier_pigeon".to_string(),
            payload: serde_json::json!({}),
        };
        assert!(matches!(
            validate_envelope(&submission),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let submission = SubmitNotification {
            tenant_id: "t1".to_string(),
            user_id: "u1".to_string(),
            channel: "email".to_string(),
            payload: serde_json::json!("not an object"),
        };
        assert!(matches!(
            validate_envelope(&submission),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn valid_envelope_passes() {
        let submission = SubmitNotification {
            tenant_id: "t1".to_string(),
            user_id: "u1".to_string(),
            channel: "email".to_string(),
            payload: serde_json::json!({"to": "a@x", "subject": "s", "body": "b"}),
        };
        assert!(validate_envelope(&submission).is_ok());
    }

    #[test]
    fn content_hash_key_is_deterministic_and_payload_sensitive() {
        let a = SubmitNotification {
            tenant_id: "t1".to_string(),
            user_id: "u1".to_string(),
            channel: "email".to_string(),
            payload: serde_json::json!({"to": "a@x", "subject": "s", "body": "b"}),
        };
        let b = SubmitNotification {
            payload: serde_json::json!({"to": "a@x", "subject": "s", "body": "different"}),
            ..a_clone(&a)
        };
        assert_eq!(content_hash_key(&a), content_hash_key(&a_clone(&a)));
        assert_ne!(content_hash_key(&a), content_hash_key(&b));
    }

    fn a_clone(s: &SubmitNotification) -> SubmitNotification {
        SubmitNotification {
            tenant_id: s.tenant_id.clone(),
            user_id: s.user_id.clone(),
            channel: s.channel.clone(),
            payload: s.payload.clone(),
        }
    }

    #[test]
    fn rate_limit_key_prefers_tenant() {
        assert_eq!(rate_limit_key(Some("t1"), "1.2.3.4"), "tenant:t1");
        assert_eq!(rate_limit_key(None, "1.2.3.4"), "ip:1.2.3.4");
        assert_eq!(rate_limit_key(Some(""), "1.2.3.4"), "ip:1.2.3.4");
    }
}
