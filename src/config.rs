use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub queue_bridge: Option<QueueBridgeConfig>,
    pub channels: ChannelProviderConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub idempotency: IdempotencyConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
    pub log_level: String,
    /// Timeout budget (seconds) propagated to request handlers.
    pub request_timeout_seconds: u64,
    /// Drain window (seconds) honoured on graceful shutdown.
    pub shutdown_drain_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u8,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Present iff the `SQS_QUEUE_URL` environment variable is set. Absence
/// disables the Queue Bridge without affecting the rest of the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueBridgeConfig {
    pub queue_url: String,
    pub dlq_url: Option<String>,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelProviderConfig {
    pub aws_region: Option<String>,
    pub ses_from_email: Option<String>,
    pub sns_region: Option<String>,
    pub webhook_timeout_seconds: u64,
    /// HTTP endpoints the Email/SMS senders POST to. Not named in the wire
    /// contract's env var table; added here because the senders need
    /// somewhere to deliver to and nothing in the pack grounds an actual
    /// `aws-sdk-ses`/`aws-sdk-sns` integration (see DESIGN.md).
    pub email_provider_endpoint: String,
    pub sms_provider_endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Admission limit per window, per tenant (or per client IP fallback key).
    pub limit_per_window: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub poll_interval_seconds: u64,
    pub batch_size: u32,
    pub max_attempts: u32,
    pub worker_concurrency: u32,
    /// Whether `circuit-open` failures increment the attempt counter.
    /// See DESIGN.md for the rationale (an explicitly flagged open question).
    pub count_circuit_open_as_attempt: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencyConfig {
    pub caller_key_ttl_seconds: u64,
    pub content_hash_ttl_seconds: u64,
    pub reservation_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub max_failures: u32,
    pub recovery_timeout_seconds: u64,
    pub half_open_max_requests: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                env: env::var("ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                shutdown_drain_seconds: env::var("SHUTDOWN_DRAIN_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            database: DatabaseConfig {
                url: database_url(),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            redis: RedisConfig {
                host: env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("REDIS_PORT")
                    .unwrap_or_else(|_| "6379".to_string())
                    .parse()
                    .unwrap_or(6379),
                password: env::var("REDIS_PASSWORD").ok(),
                db: env::var("REDIS_DB")
                    .unwrap_or_else(|_| "0".to_string())
                    .parse()
                    .unwrap_or(0),
            },
            queue_bridge: env::var("SQS_QUEUE_URL").ok().map(|queue_url| {
                QueueBridgeConfig {
                    queue_url,
                    dlq_url: env::var("SQS_DLQ_URL").ok(),
                    region: env::var("SQS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                }
            }),
            channels: ChannelProviderConfig {
                aws_region: env::var("AWS_REGION").ok(),
                ses_from_email: env::var("SES_FROM_EMAIL").ok(),
                sns_region: env::var("SNS_REGION").ok(),
                webhook_timeout_seconds: env::var("WEBHOOK_TIMEOUT")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                email_provider_endpoint: env::var("EMAIL_PROVIDER_ENDPOINT")
                    .unwrap_or_else(|_| "http://localhost:9100/send-email".to_string()),
                sms_provider_endpoint: env::var("SMS_PROVIDER_ENDPOINT")
                    .unwrap_or_else(|_| "http://localhost:9100/send-sms".to_string()),
            },
            rate_limit: RateLimitConfig {
                limit_per_window: env::var("RATE_LIMIT_PER_WINDOW")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100),
                window_seconds: env::var("RATE_LIMIT_WINDOW_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            },
            retry: RetryConfig {
                poll_interval_seconds: env::var("WORKER_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                batch_size: env::var("WORKER_BATCH_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
                max_attempts: env::var("MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                worker_concurrency: env::var("WORKER_CONCURRENCY")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                count_circuit_open_as_attempt: env::var("COUNT_CIRCUIT_OPEN_AS_ATTEMPT")
                    .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
            },
            idempotency: IdempotencyConfig {
                caller_key_ttl_seconds: env::var("IDEMPOTENCY_CALLER_KEY_TTL_SECONDS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86400),
                content_hash_ttl_seconds: env::var("IDEMPOTENCY_CONTENT_HASH_TTL_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                reservation_ttl_seconds: env::var("IDEMPOTENCY_RESERVATION_TTL_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            circuit_breaker: CircuitBreakerConfig {
                max_failures: env::var("CIRCUIT_BREAKER_MAX_FAILURES")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                recovery_timeout_seconds: env::var("CIRCUIT_BREAKER_RECOVERY_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                half_open_max_requests: env::var("CIRCUIT_BREAKER_HALF_OPEN_MAX_REQUESTS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1),
            },
        })
    }
}

/// `DB_HOST`/`DB_PORT`/`DB_USER`/`DB_PASSWORD`/`DB_NAME`/`DB_SSLMODE` describe a
/// relational store in the wire contract; the core ships against SQLite, so
/// an explicit `DATABASE_URL` takes precedence and the `DB_*` family is used
/// only to compose a default file-backed location when unset.
fn database_url() -> String {
    if let Ok(url) = env::var("DATABASE_URL") {
        return url;
    }
    let name = env::var("DB_NAME").unwrap_or_else(|_| "notifyhub".to_string());
    format!("sqlite://data/{}.db", name)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                env: "development".to_string(),
                log_level: "info".to_string(),
                request_timeout_seconds: 30,
                shutdown_drain_seconds: 30,
            },
            database: DatabaseConfig {
                url: "sqlite://data/notifyhub.db".to_string(),
                max_connections: 5,
            },
            redis: RedisConfig {
                host: "127.0.0.1".to_string(),
                port: 6379,
                password: None,
                db: 0,
            },
            queue_bridge: None,
            channels: ChannelProviderConfig {
                aws_region: None,
                ses_from_email: None,
                sns_region: None,
                webhook_timeout_seconds: 10,
                email_provider_endpoint: "http://localhost:9100/send-email".to_string(),
                sms_provider_endpoint: "http://localhost:9100/send-sms".to_string(),
            },
            rate_limit: RateLimitConfig {
                limit_per_window: 100,
                window_seconds: 60,
            },
            retry: RetryConfig {
                poll_interval_seconds: 5,
                batch_size: 20,
                max_attempts: 5,
                worker_concurrency: 10,
                count_circuit_open_as_attempt: false,
            },
            idempotency: IdempotencyConfig {
                caller_key_ttl_seconds: 86400,
                content_hash_ttl_seconds: 300,
                reservation_ttl_seconds: 30,
            },
            circuit_breaker: CircuitBreakerConfig {
                max_failures: 5,
                recovery_timeout_seconds: 30,
                half_open_max_requests: 1,
            },
        }
    }
}
