use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::db::models::Notification;

use super::sender::{Channel, ChannelSender, SendError};

#[derive(Debug, Deserialize)]
struct SmsPayload {
    phone_number: String,
    message: String,
}

/// Publishes one SMS per call via a configured HTTP provider endpoint.
#[derive(Clone)]
pub struct SmsSender {
    client: reqwest::Client,
    provider_endpoint: String,
}

impl SmsSender {
    pub fn new(client: reqwest::Client, provider_endpoint: String) -> Self {
        Self {
            client,
            provider_endpoint,
        }
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let payload: SmsPayload = serde_json::from_str(&notification.payload)
            .map_err(|e| SendError::Validation(format!("invalid sms payload: {e}")))?;

        if payload.phone_number.trim().is_empty() {
            return Err(SendError::Validation(
                "sms 'phone_number' must be non-empty".to_string(),
            ));
        }
        if payload.message.trim().is_empty() {
            return Err(SendError::Validation("sms 'message' must be non-empty".to_string()));
        }

        let response = self
            .client
            .post(&self.provider_endpoint)
            .json(&serde_json::json!({
                "phone_number": payload.phone_number,
                "message": payload.message,
            }))
            .send()
            .await
            .map_err(|e| SendError::Provider(format!("sms provider request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(notification_id = %notification.id, %status, "sms provider returned failure");
            return Err(SendError::Provider(format!(
                "sms provider returned status {status}"
            )));
        }

        debug!(notification_id = %notification.id, "sms delivered");
        Ok(())
    }
}
