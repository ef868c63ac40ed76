pub mod dlq_repository;
pub mod notification_repository;

pub use dlq_repository::DlqRepository;
pub use notification_repository::NotificationRepository;
