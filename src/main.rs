use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{http::HeaderValue, routing::get, Router};
use tokio::{signal, sync::mpsc};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

use livraria_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    cfg.is_production_ready()
        .map_err(|reason| anyhow::anyhow!("configuration is not production ready: {}", reason))?;

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::setup_schema(&db_pool)
            .await
            .context("failed to create schema")?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Rate limiter: in-memory by default, Redis-backed across instances
    let rl_config = api::rate_limiter::RateLimitConfig {
        requests_per_window: cfg.checkout_rate_limit,
        window_duration: Duration::from_secs(cfg.rate_limit_window_seconds),
    };
    let rl_backend = if cfg.rate_limit_use_redis {
        let client = redis::Client::open(cfg.redis_url.clone())
            .context("failed to create Redis client for rate limiting")?;
        api::rate_limiter::RateLimitBackend::Redis {
            client: Arc::new(client),
            namespace: cfg.rate_limit_namespace.clone(),
        }
    } else {
        api::rate_limiter::RateLimitBackend::InMemory
    };
    let rate_limiter = api::rate_limiter::RateLimiter::new(rl_config, rl_backend);
    tokio::spawn(api::rate_limiter::start_cleanup_task(
        rate_limiter.clone(),
        Duration::from_secs(300),
    ));

    // Auth + payment gateway
    let auth_service = Arc::new(api::auth::AuthService::new(
        &cfg.jwt_secret,
        cfg.jwt_expiration,
    ));
    let gateway = Arc::new(
        api::gateway::HttpCheckoutGateway::new(api::gateway::GatewaySettings::from_config(&cfg))
            .context("failed to construct payment gateway client")?,
    );

    // Compose shared app state
    let app_state = api::AppState::new(
        db_arc,
        cfg.clone(),
        event_sender,
        rate_limiter,
        auth_service.clone(),
        gateway,
    );

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        info!("Using permissive CORS because explicit origins were not configured");
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        anyhow::bail!("missing CORS configuration");
    };

    // Build router: status/health + v1 API + Swagger UI
    let app = Router::<api::AppState>::new()
        .route("/", get(|| async { "livraria-api up" }))
        .nest("/api/v1", api::api_v1_routes())
        .merge(api::openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer)
        // Make the auth service reachable from the identity extractor
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            api::auth::inject_auth_service,
        ))
        .with_state(app_state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("livraria-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
