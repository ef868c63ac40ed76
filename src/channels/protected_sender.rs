use std::sync::Arc;

use async_trait::async_trait;

use crate::db::models::Notification;

use super::circuit_breaker::CircuitBreaker;
use super::sender::{Channel, ChannelSender, SendError};

/// Wraps a sender with one circuit breaker. `send` consults `allow()` first;
/// if denied, returns `circuit-open` without invoking the inner sender.
/// `supports` delegates to the inner sender.
pub struct ProtectedSender {
    inner: Arc<dyn ChannelSender>,
    breaker: Arc<CircuitBreaker>,
}

impl ProtectedSender {
    pub fn new(inner: Arc<dyn ChannelSender>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl ChannelSender for ProtectedSender {
    fn channel(&self) -> Channel {
        self.inner.channel()
    }

    fn supports(&self, channel: Channel) -> bool {
        self.inner.supports(channel)
    }

    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        if !self.breaker.allow() {
            return Err(SendError::CircuitOpen);
        }

        match self.inner.send(notification).await {
            Ok(()) => {
                self.breaker.record_success();
                Ok(())
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }
}
