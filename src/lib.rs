//! Livraria API Library
//!
//! Backend for the Livraria bookstore storefront: checkout session creation
//! against the external payment processor, webhook-driven payment
//! reconciliation, and client-side purchase recording, converging on a
//! durable purchase-history store exactly once per order.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod rate_limiter;
pub mod security;
pub mod services;
pub mod webhook;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::gateway::CheckoutGateway;
use crate::rate_limiter::RateLimiter;
use crate::services::checkout::CheckoutService;
use crate::services::pending_purchases::PendingPurchaseService;
use crate::services::purchase_history::PurchaseHistoryService;
use crate::services::reconciliation::ReconciliationService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub event_sender: EventSender,
    pub rate_limiter: RateLimiter,
    pub auth: Arc<AuthService>,
    pub checkout_service: CheckoutService,
    pub reconciliation_service: ReconciliationService,
    pub purchase_history_service: PurchaseHistoryService,
}

impl AppState {
    /// Wires the service layer over one database handle and gateway.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
        event_sender: EventSender,
        rate_limiter: RateLimiter,
        auth: Arc<AuthService>,
        gateway: Arc<dyn CheckoutGateway>,
    ) -> Self {
        let pending = PendingPurchaseService::new(db.clone());
        let history = PurchaseHistoryService::new(db.clone());
        let reconciliation =
            ReconciliationService::new(pending.clone(), history.clone(), event_sender.clone());
        let high_value_threshold = {
            use rust_decimal::prelude::FromPrimitive;
            rust_decimal::Decimal::from_f64(config.high_value_threshold)
                .unwrap_or_else(|| rust_decimal::Decimal::from(10_000))
        };
        let checkout = CheckoutService::new(
            pending,
            gateway,
            event_sender.clone(),
            high_value_threshold,
        );

        Self {
            db,
            config,
            event_sender,
            rate_limiter,
            auth,
            checkout_service: checkout,
            reconciliation_service: reconciliation,
            purchase_history_service: history,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Versioned API surface: status/health plus the checkout-to-purchase
/// reconciliation pipeline.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .route(
            "/checkout/session",
            post(handlers::checkout::create_checkout_session),
        )
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .route(
            "/purchases/record",
            post(handlers::purchases::record_purchase),
        )
        .route("/purchases", get(handlers::purchases::list_purchases))
}

async fn api_status() -> ApiResult<Value> {
    let version = env!("CARGO_PKG_VERSION");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "service": "livraria-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
