#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request},
    middleware,
    response::Response,
    Router,
};
use sea_orm::{Database, DatabaseConnection};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use livraria_api::auth::{inject_auth_service, AuthService};
use livraria_api::config::AppConfig;
use livraria_api::events::{self, EventSender};
use livraria_api::gateway::{
    CheckoutGateway, CheckoutSessionSpec, GatewayError, GatewaySession,
};
use livraria_api::rate_limiter::{RateLimitConfig, RateLimiter};
use livraria_api::{api_v1_routes, db, AppState};

/// Gateway double used by the integration tests: deterministic session ids
/// and URLs, optionally failing to simulate a broken processor.
#[derive(Default)]
pub struct StubGateway {
    pub fail: bool,
}

#[async_trait]
impl CheckoutGateway for StubGateway {
    async fn create_checkout_session(
        &self,
        spec: CheckoutSessionSpec,
    ) -> Result<GatewaySession, GatewayError> {
        if self.fail {
            return Err(GatewayError::MissingRedirectUrl);
        }
        Ok(GatewaySession {
            id: format!("sess_{}", spec.reference_id),
            url: format!("https://pay.test/session/{}", spec.reference_id),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Arc<DatabaseConnection>,
    pub auth: Arc<AuthService>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        redis_url: "redis://localhost:6379".to_string(),
        jwt_secret:
            "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing"
                .to_string(),
        jwt_expiration: 3600,
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "development".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        auto_migrate: true,
        cors_allowed_origins: None,
        cors_allow_any_origin: false,
        db_max_connections: 5,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        rate_limit_window_seconds: 60,
        checkout_rate_limit: 20,
        webhook_rate_limit: 240,
        recorder_rate_limit: 60,
        rate_limit_use_redis: false,
        rate_limit_namespace: "livraria-test:rl".to_string(),
        gateway_base_url: "https://pay.processor.test".to_string(),
        gateway_api_key: "sk_test".to_string(),
        gateway_currency: "BRL".to_string(),
        gateway_payment_methods: vec!["card".to_string(), "pix".to_string()],
        checkout_success_url: "https://livraria.test/checkout/success".to_string(),
        checkout_cancel_url: "https://livraria.test/cart".to_string(),
        payment_webhook_url: "https://api.livraria.test/api/v1/payments/webhook".to_string(),
        payment_webhook_secret: None,
        high_value_threshold: 10_000.0,
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(Arc::new(StubGateway::default()), |_| {}).await
    }

    pub async fn with_gateway(gateway: Arc<dyn CheckoutGateway>) -> Self {
        Self::build(gateway, |_| {}).await
    }

    pub async fn with_config(mutate: impl FnOnce(&mut AppConfig)) -> Self {
        Self::build(Arc::new(StubGateway::default()), mutate).await
    }

    async fn build(
        gateway: Arc<dyn CheckoutGateway>,
        mutate: impl FnOnce(&mut AppConfig),
    ) -> Self {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        db::setup_schema(&db).await.expect("schema setup");
        let db = Arc::new(db);

        let mut config = test_config();
        mutate(&mut config);

        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(events::process_events(event_rx));

        let auth = Arc::new(AuthService::new(&config.jwt_secret, config.jwt_expiration));
        let rate_limiter = RateLimiter::in_memory(RateLimitConfig {
            requests_per_window: config.checkout_rate_limit,
            window_duration: std::time::Duration::from_secs(config.rate_limit_window_seconds),
        });

        let state = AppState::new(
            db.clone(),
            config,
            EventSender::new(event_tx),
            rate_limiter,
            auth.clone(),
            gateway,
        );

        let router = Router::new()
            .nest("/api/v1", api_v1_routes())
            .layer(middleware::from_fn_with_state(
                auth.clone(),
                inject_auth_service,
            ))
            .with_state(state);

        Self { router, db, auth }
    }

    pub fn token_for(&self, user_id: Uuid) -> String {
        self.auth
            .issue_token(user_id, None)
            .expect("token creation")
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: Value,
        token: Option<&str>,
        ip: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(ip) = ip {
            builder = builder.header("x-forwarded-for", ip);
        }
        let request = builder
            .body(Body::from(body.to_string()))
            .expect("request body");
        self.router.clone().oneshot(request).await.expect("response")
    }

    pub async fn post_raw(
        &self,
        path: &str,
        content_type: Option<&str>,
        body: &[u8],
        extra_headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(Method::POST).uri(path);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(body.to_vec()))
            .expect("request body");
        self.router.clone().oneshot(request).await.expect("response")
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Response {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = builder.body(Body::empty()).expect("request body");
        self.router.clone().oneshot(request).await.expect("response")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
