use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::db::models::Notification;

use super::sender::{Channel, ChannelSender, SendError};

#[derive(Debug, Deserialize)]
struct EmailPayload {
    to: String,
    subject: String,
    body: String,
}

/// Sends one email per call via a configured HTTP provider endpoint. Holds
/// no per-instance state beyond its client and configuration, so it is safe
/// to share across concurrent worker tasks.
#[derive(Clone)]
pub struct EmailSender {
    client: reqwest::Client,
    provider_endpoint: String,
    from_address: String,
}

impl EmailSender {
    pub fn new(client: reqwest::Client, provider_endpoint: String, from_address: String) -> Self {
        Self {
            client,
            provider_endpoint,
            from_address,
        }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let payload: EmailPayload = serde_json::from_str(&notification.payload)
            .map_err(|e| SendError::Validation(format!("invalid email payload: {e}")))?;

        if payload.to.trim().is_empty() {
            return Err(SendError::Validation("email 'to' must be non-empty".to_string()));
        }
        if payload.subject.trim().is_empty() {
            return Err(SendError::Validation(
                "email 'subject' must be non-empty".to_string(),
            ));
        }
        if payload.body.trim().is_empty() {
            return Err(SendError::Validation("email 'body' must be non-empty".to_string()));
        }

        let response = self
            .client
            .post(&self.provider_endpoint)
            .json(&serde_json::json!({
                "from": self.from_address,
                "to": payload.to,
                "subject": payload.subject,
                "body": payload.body,
            }))
            .send()
            .await
            .map_err(|e| SendError::Provider(format!("email provider request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(notification_id = %notification.id, %status, "email provider returned failure");
            return Err(SendError::Provider(format!(
                "email provider returned status {status}"
            )));
        }

        debug!(notification_id = %notification.id, to = %payload.to, "email delivered");
        Ok(())
    }
}
