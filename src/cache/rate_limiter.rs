use redis::AsyncCommands;
use tracing::warn;
use uuid::Uuid;

use super::{CacheError, RedisCache};

#[derive(Debug, Clone)]
pub struct AllowResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: i64,
}

/// Sliding-window admission control over a Redis sorted set per key: each
/// admitted call is recorded as a member scored by its timestamp (ms);
/// entries older than the window are pruned before counting. Degrades open
/// (admits, logs) when Redis is unreachable, matching the rate limiter's
/// contract.
pub struct RateLimiter {
    redis: RedisCache,
    limit: u32,
    window_seconds: u64,
}

impl RateLimiter {
    pub fn new(redis: RedisCache, limit: u32, window_seconds: u64) -> Self {
        Self {
            redis,
            limit,
            window_seconds,
        }
    }

    pub async fn allow(&self, key: &str, n: u32) -> Result<AllowResult, CacheError> {
        let mut conn = self.redis.connection();
        let redis_key = format!("ratelimit:{key}");
        let window_ms = self.window_seconds as i64 * 1000;
        let now_ms = now_millis();
        let cutoff = now_ms - window_ms;

        let _: u64 = conn.zrembyscore(&redis_key, 0, cutoff).await?;
        let count: u32 = conn.zcard(&redis_key).await?;

        if count + n > self.limit {
            let oldest: Vec<(String, i64)> = conn
                .zrangebyscore_withscores(&redis_key, 0, "+inf")
                .await
                .unwrap_or_default();
            let reset_at = oldest
                .first()
                .map(|(_, score)| (score + window_ms) / 1000)
                .unwrap_or_else(|| (now_ms + window_ms) / 1000);

            return Ok(AllowResult {
                allowed: false,
                remaining: self.limit.saturating_sub(count),
                reset_at,
            });
        }

        let mut pipe = redis::pipe();
        for _ in 0..n {
            pipe.zadd(&redis_key, Uuid::new_v4().to_string(), now_ms);
        }
        pipe.expire(&redis_key, self.window_seconds as i64);
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(AllowResult {
            allowed: true,
            remaining: self.limit.saturating_sub(count + n),
            reset_at: (now_ms + window_ms) / 1000,
        })
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Best-effort helper: admits the request and logs if the cache backing the
/// limiter is unreachable, per the "degrades open" contract.
pub async fn allow_best_effort(
    limiter: Option<&RateLimiter>,
    key: &str,
    n: u32,
    default_limit: u32,
) -> AllowResult {
    let Some(limiter) = limiter else {
        return AllowResult {
            allowed: true,
            remaining: default_limit,
            reset_at: 0,
        };
    };

    match limiter.allow(key, n).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = ?e, "rate limiter cache unreachable, admitting request");
            AllowResult {
                allowed: true,
                remaining: default_limit,
                reset_at: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_key_is_namespaced() {
        let key = format!("ratelimit:{}", "tenant:t1");
        assert_eq!(key, "ratelimit:tenant:t1");
    }
}
