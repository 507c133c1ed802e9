use axum::http::HeaderMap;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use utoipa::IntoParams;

use crate::errors::ServiceError;
use crate::rate_limiter::RateLimitConfig;
use crate::security::{self, SecurityEvent};
use crate::AppState;

/// Best-effort caller address for rate limiting, honoring the proxy headers
/// the hosting platform sets.
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(ip) = forwarded_str.split(',').next() {
                return ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    "unknown".to_string()
}

/// Counts the request against `key` with an endpoint-specific limit. A
/// denial logs only the identifier and endpoint, never the request content.
pub async fn enforce_rate_limit(
    state: &AppState,
    key: &str,
    requests_per_window: u32,
    endpoint: &'static str,
) -> Result<(), ServiceError> {
    let limiter = state.rate_limiter.with_config(RateLimitConfig {
        requests_per_window,
        window_duration: Duration::from_secs(state.config.rate_limit_window_seconds),
    });

    let result = limiter.check_rate_limit(key).await;
    if !result.allowed {
        counter!("rate_limit_denied_total", 1, "endpoint" => endpoint);
        security::log_security_event(
            SecurityEvent::RateLimitExceeded,
            json!({ "identifier": key, "endpoint": endpoint }),
        );
        return Err(ServiceError::RateLimitExceeded);
    }
    counter!("rate_limit_allowed_total", 1, "endpoint" => endpoint);
    Ok(())
}

/// Pagination parameters for list operations.
#[derive(Debug, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}
