use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{error_handling::HandleErrorLayer, routing::get, BoxError, Router};
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod channels;
mod config;
mod db;
mod error;
mod extract;
mod routes;
mod services;

use cache::{IdempotencyCache, RateLimiter, RedisCache};
use channels::{circuit_breaker::CircuitBreakerConfig as BreakerConfig, CircuitBreaker, ProtectedSender, Router as ChannelRouter};
use config::Config;
use error::AppError;
use services::{AcceptanceService, DlqService, HttpQueueBridge, NoopQueueBridge, QueueBridge, Worker};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub acceptance: AcceptanceService,
    pub dlq: DlqService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notifyhub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting notifyhub");

    let pool = services::init::init_db(&config).await?;

    let redis = match RedisCache::connect(&config.redis.url()).await {
        Ok(redis) => Some(redis),
        Err(e) => {
            tracing::warn!(error = ?e, "redis unreachable at startup; idempotency and rate limiting will degrade open");
            None
        }
    };

    let idempotency_cache = redis.clone().map(|r| Arc::new(IdempotencyCache::new(r)));
    let rate_limiter = redis.clone().map(|r| {
        Arc::new(RateLimiter::new(
            r,
            config.rate_limit.limit_per_window,
            config.rate_limit.window_seconds,
        ))
    });

    let queue_bridge: Arc<dyn QueueBridge> = match &config.queue_bridge {
        Some(qb) => Arc::new(HttpQueueBridge::new(
            reqwest::Client::new(),
            qb.queue_url.clone(),
        )),
        None => Arc::new(NoopQueueBridge),
    };

    let router = build_channel_router(&config);

    let acceptance = AcceptanceService::new(
        pool.clone(),
        idempotency_cache,
        config.idempotency.clone(),
        rate_limiter,
        config.rate_limit.clone(),
        queue_bridge,
    );
    let dlq = DlqService::new(pool.clone());

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        acceptance,
        dlq,
    });

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let worker = Worker::new(app_state.db.clone(), router, config.retry.clone());
    let worker_handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .nest("/v1/notifications", routes::notifications::router())
        .nest("/v1/dlq", routes::dlq::router())
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(Duration::from_secs(config.server.request_timeout_seconds)),
        );

    let host = config.server.host.clone();
    let port = config.server.port;
    let addr = format!("{}:{}", host, port);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()));

    // Once the shutdown signal fires, in-flight connections get
    // `shutdown_drain_seconds` to finish before the server future is
    // dropped outright, forcing a hard stop.
    tokio::select! {
        res = server => { res?; }
        _ = drain_deadline(shutdown_tx.subscribe(), config.server.shutdown_drain_seconds) => {
            tracing::warn!("shutdown drain window elapsed; forcing server stop");
        }
    }

    let _ = shutdown_tx.send(());
    if tokio::time::timeout(
        Duration::from_secs(config.server.shutdown_drain_seconds),
        worker_handle,
    )
    .await
    .is_err()
    {
        tracing::warn!("worker did not finish draining within the shutdown window");
    }

    Ok(())
}

async fn drain_deadline(mut shutdown_rx: broadcast::Receiver<()>, drain_seconds: u64) {
    let _ = shutdown_rx.recv().await;
    tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
}

async fn handle_timeout_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::Timeout
    } else {
        AppError::Internal(anyhow::anyhow!(err.to_string()))
    }
}

fn build_channel_router(config: &Config) -> Arc<ChannelRouter> {
    let client = reqwest::Client::new();
    let breaker_config = BreakerConfig {
        max_failures: config.circuit_breaker.max_failures,
        recovery_timeout: std::time::Duration::from_secs(
            config.circuit_breaker.recovery_timeout_seconds,
        ),
        half_open_max_requests: config.circuit_breaker.half_open_max_requests,
    };

    let email = Arc::new(channels::email::EmailSender::new(
        client.clone(),
        config.channels.email_provider_endpoint.clone(),
        config
            .channels
            .ses_from_email
            .clone()
            .unwrap_or_else(|| "notifications@notifyhub.local".to_string()),
    ));
    let sms = Arc::new(channels::sms::SmsSender::new(
        client.clone(),
        config.channels.sms_provider_endpoint.clone(),
    ));
    let webhook = Arc::new(channels::webhook::WebhookSender::new(
        client,
        config.channels.webhook_timeout_seconds,
    ));

    let senders: Vec<Arc<dyn channels::ChannelSender>> = vec![
        Arc::new(ProtectedSender::new(
            email,
            Arc::new(CircuitBreaker::new(breaker_config.clone())),
        )),
        Arc::new(ProtectedSender::new(
            sms,
            Arc::new(CircuitBreaker::new(breaker_config.clone())),
        )),
        Arc::new(ProtectedSender::new(
            webhook,
            Arc::new(CircuitBreaker::new(breaker_config)),
        )),
    ];

    Arc::new(ChannelRouter::new(senders))
}

async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining in-flight requests");
    let _ = shutdown_tx.send(());
}
