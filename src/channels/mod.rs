pub mod circuit_breaker;
pub mod email;
pub mod protected_sender;
pub mod router;
pub mod sender;
pub mod sms;
pub mod webhook;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use protected_sender::ProtectedSender;
pub use router::Router;
pub use sender::{Channel, ChannelSender, SendError};
