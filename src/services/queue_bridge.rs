use async_trait::async_trait;

use crate::db::models::Notification;

/// Optional alternative dispatch path: acceptance additionally enqueues to
/// an external broker and a consumer invokes the Router. Additive only —
/// the core must deliver correctly from the Store alone with the bridge
/// absent.
#[async_trait]
pub trait QueueBridge: Send + Sync {
    async fn enqueue(&self, notification: &Notification) -> Result<(), String>;
}

/// Used when no `SQS_QUEUE_URL` is configured. The pipeline relies solely on
/// the Worker polling the Store.
pub struct NoopQueueBridge;

#[async_trait]
impl QueueBridge for NoopQueueBridge {
    async fn enqueue(&self, _notification: &Notification) -> Result<(), String> {
        Ok(())
    }
}

/// Enqueues to a generic HTTP-fronted broker endpoint. Deliberately not
/// `aws-sdk-sqs`: nothing in the retrieval pack grounds that SDK's actual
/// use, so the bridge speaks plain HTTP against the configured queue URL
/// instead (see DESIGN.md).
pub struct HttpQueueBridge {
    client: reqwest::Client,
    queue_url: String,
}

impl HttpQueueBridge {
    pub fn new(client: reqwest::Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl QueueBridge for HttpQueueBridge {
    async fn enqueue(&self, notification: &Notification) -> Result<(), String> {
        let response = self
            .client
            .post(&self.queue_url)
            .json(&serde_json::json!({
                "notification_id": notification.id,
                "tenant_id": notification.tenant_id,
                "channel": notification.channel,
            }))
            .send()
            .await
            .map_err(|e| format!("queue bridge request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!(
                "queue bridge responded with status {}",
                response.status()
            ));
        }

        Ok(())
    }
}
