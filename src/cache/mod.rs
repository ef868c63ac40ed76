pub mod idempotency;
pub mod rate_limiter;

pub use idempotency::IdempotencyCache;
pub use rate_limiter::RateLimiter;

use redis::{aio::ConnectionManager, Client};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Thin wrapper around a Redis `ConnectionManager`, shared by the idempotency
/// cache and the rate limiter. `ConnectionManager` is internally cheap to
/// clone and reconnects transparently, matching the assumption in the
/// concurrency model that the cache client is internally thread-safe.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    pub async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }
}
