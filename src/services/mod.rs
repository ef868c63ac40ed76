pub mod acceptance;
pub mod dlq;
pub mod init;
pub mod queue_bridge;
pub mod worker;

pub use acceptance::AcceptanceService;
pub use dlq::DlqService;
pub use queue_bridge::{HttpQueueBridge, NoopQueueBridge, QueueBridge};
pub use worker::Worker;
