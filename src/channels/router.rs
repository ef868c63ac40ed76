use std::sync::Arc;

use crate::db::models::Notification;

use super::sender::{Channel, ChannelSender, SendError};

/// Holds an ordered list of (protected) senders and dispatches a
/// notification to the first one whose `supports(channel)` is true. No
/// sender supporting the channel is a fatal, non-retriable routing error.
pub struct Router {
    senders: Vec<Arc<dyn ChannelSender>>,
}

impl Router {
    pub fn new(senders: Vec<Arc<dyn ChannelSender>>) -> Self {
        Self { senders }
    }

    pub async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let Some(channel) = Channel::parse(&notification.channel) else {
            return Err(SendError::Routing);
        };

        for sender in &self.senders {
            if sender.supports(channel) {
                return sender.send(notification).await;
            }
        }

        Err(SendError::Routing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct AlwaysOk(Channel);

    #[async_trait]
    impl ChannelSender for AlwaysOk {
        fn channel(&self) -> Channel {
            self.0
        }

        async fn send(&self, _notification: &Notification) -> Result<(), SendError> {
            Ok(())
        }
    }

    fn notification(channel: &str) -> Notification {
        let now = chrono::Utc::now().naive_utc();
        Notification {
            id: "n1".to_string(),
            tenant_id: "t1".to_string(),
            user_id: "u1".to_string(),
            channel: channel.to_string(),
            payload: "{}".to_string(),
            status: "pending".to_string(),
            attempt: 0,
            last_error: None,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn dispatches_to_the_first_matching_sender() {
        let router = Router::new(vec![
            Arc::new(AlwaysOk(Channel::Email)),
            Arc::new(AlwaysOk(Channel::Sms)),
        ]);

        assert!(router.send(&notification("sms")).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_channel_is_a_routing_error() {
        let router = Router::new(vec![Arc::new(AlwaysOk(Channel::Email))]);
        let result = router.send(&notification("carrier_pigeon")).await;
        assert!(matches!(result, Err(SendError::Routing)));
    }

    #[tokio::test]
    async fn no_registered_sender_is_a_routing_error() {
        let router = Router::new(vec![Arc::new(AlwaysOk(Channel::Email))]);
        let result = router.send(&notification("sms")).await;
        assert!(matches!(result, Err(SendError::Routing)));
    }
}
