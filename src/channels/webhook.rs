use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::db::models::Notification;

use super::sender::{Channel, ChannelSender, SendError};

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Value,
    timeout_seconds: Option<u64>,
}

fn default_method() -> String {
    "POST".to_string()
}

const FIRST_KB: usize = 1024;

/// Calls a caller-supplied HTTP endpoint. Always sets `Content-Type:
/// application/json`, a user-agent tag, and tracking headers carrying the
/// notification and tenant identifiers; caller headers are merged on top
/// (and may override the tracking headers, matching "merged on top").
#[derive(Clone)]
pub struct WebhookSender {
    client: reqwest::Client,
    default_timeout: Duration,
    max_timeout: Duration,
}

impl WebhookSender {
    pub fn new(client: reqwest::Client, default_timeout_seconds: u64) -> Self {
        Self {
            client,
            default_timeout: Duration::from_secs(default_timeout_seconds),
            max_timeout: Duration::from_secs(default_timeout_seconds.max(60)),
        }
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    fn channel(&self) -> Channel {
        Channel::Webhook
    }

    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let payload: WebhookPayload = serde_json::from_str(&notification.payload)
            .map_err(|e| SendError::Validation(format!("invalid webhook payload: {e}")))?;

        if payload.url.trim().is_empty() {
            return Err(SendError::Validation("webhook 'url' must be non-empty".to_string()));
        }

        let method = parse_method(&payload.method)?;

        let timeout = payload
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
            .min(self.max_timeout);

        let mut request = self
            .client
            .request(method, &payload.url)
            .timeout(timeout)
            .header("content-type", "application/json")
            .header("user-agent", "notifyhub/0.1")
            .header("x-notification-id", notification.id.as_str())
            .header("x-tenant-id", notification.tenant_id.as_str())
            .json(&payload.body);

        for (name, value) in &payload.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SendError::Provider(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if !is_success_status(status.as_u16()) {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(FIRST_KB).collect();
            warn!(notification_id = %notification.id, %status, "webhook returned failure");
            return Err(SendError::Provider(format!(
                "webhook responded with status {status}: {truncated}"
            )));
        }

        debug!(notification_id = %notification.id, url = %payload.url, "webhook delivered");
        Ok(())
    }
}

fn parse_method(method: &str) -> Result<Method, SendError> {
    match method.to_uppercase().as_str() {
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        other => Err(SendError::Validation(format!(
            "webhook method must be POST, PUT, or PATCH, got {other}"
        ))),
    }
}

/// Responses with status outside `[200, 300)` are treated as failure.
fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_rejected() {
        assert!(parse_method("GET").is_err());
    }

    #[test]
    fn post_put_patch_are_accepted() {
        assert!(parse_method("POST").is_ok());
        assert!(parse_method("put").is_ok());
        assert!(parse_method("PATCH").is_ok());
    }

    #[test]
    fn status_boundaries() {
        assert!(!is_success_status(199));
        assert!(is_success_status(200));
        assert!(is_success_status(299));
        assert!(!is_success_status(300));
    }

    #[test]
    fn payload_defaults_method_to_post() {
        let payload: WebhookPayload =
            serde_json::from_str(r#"{"url":"https://example.com/hook","body":{}}"#).unwrap();
        assert_eq!(payload.method, "POST");
    }
}
