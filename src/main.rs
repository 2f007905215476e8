use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use prometheus::TextEncoder;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shared_ratelimit::{
    config::{load_config_from_file, EngineConfig, RateLimitConfig},
    limiter::RateLimiter,
    metrics::Metrics,
    middleware::rate_limit_middleware,
    redis::StoreSource,
    service::RateLimitService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shared_ratelimit=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting shared rate limit service");

    let config = load_config()?;
    let metrics = Arc::new(Metrics::new()?);
    let service = create_service(config, metrics).await?;

    let http_addr = std::env::var("HTTP_PORT")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse::<SocketAddr>()?;

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .layer(axum::middleware::from_fn_with_state(
            service.clone(),
            rate_limit_middleware,
        ))
        .route("/healthcheck", get(health_check))
        .route("/metrics", get(metrics_handler))
        .with_state(service);

    let listener = TcpListener::bind(http_addr).await?;
    info!("HTTP server listening on {}", http_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    })
    .await?;

    info!("Service stopped");
    Ok(())
}

fn load_config() -> Result<RateLimitConfig> {
    let mut config = match std::env::var("CONFIG_PATH") {
        Ok(path) => {
            info!("Loading configuration from: {}", path);
            load_config_from_file(&path)?
        }
        Err(_) => RateLimitConfig::default(),
    };

    if let Ok(redis_url) = std::env::var("REDIS_URL") {
        config.redis.url = redis_url;
    }

    Ok(config)
}

async fn create_service(
    config: RateLimitConfig,
    metrics: Arc<Metrics>,
) -> Result<Arc<RateLimitService>> {
    let config = EngineConfig::compile(config)?;
    info!(
        limit = config.limit,
        window_ms = config.window.as_millis() as u64,
        rules = config.rules.len(),
        "Configuration loaded"
    );

    let source = StoreSource::FromOptions(config.redis.to_redis_config());
    let limiter = RateLimiter::connect(config, source).await?;

    Ok(Arc::new(RateLimitService::new(limiter, metrics)))
}

async fn health_check(
    State(service): State<Arc<RateLimitService>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match service.health_check().await {
        Ok(()) => Ok(Json(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn metrics_handler(
    State(service): State<Arc<RateLimitService>>,
) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = service.metrics().registry().gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics) => Ok(metrics),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
