use async_trait::async_trait;

use crate::db::models::Notification;

/// One of the closed set of delivery transports. A closed sum is preferable
/// to open-ended polymorphism here: the Router never needs to dispatch on a
/// channel it doesn't already know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Email,
    Sms,
    Webhook,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Webhook => "webhook",
        }
    }

    pub fn parse(tag: &str) -> Option<Channel> {
        match tag {
            "email" => Some(Channel::Email),
            "sms" => Some(Channel::Sms),
            "webhook" => Some(Channel::Webhook),
            _ => None,
        }
    }
}

/// Faults returned by a sender. Everything except `CircuitOpen` (added by the
/// protected-sender decorator, never by a sender itself) is retriable by the
/// Worker until `max_attempts` is reached; classification beyond this is
/// deliberately not attempted (see the error handling design).
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    #[error("payload validation failed: {0}")]
    Validation(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("circuit open")]
    CircuitOpen,

    #[error("no sender supports this channel")]
    Routing,
}

/// A component that attempts one delivery to one channel. Implementations
/// must be free of hidden per-instance state that would prevent concurrent
/// invocation (senders are shared across the worker's concurrent tasks).
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    fn supports(&self, channel: Channel) -> bool {
        self.channel() == channel
    }

    async fn send(&self, notification: &Notification) -> Result<(), SendError>;
}
