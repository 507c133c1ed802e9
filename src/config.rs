use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::info;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_CHECKOUT_RATE_LIMIT: u32 = 20;
const DEFAULT_WEBHOOK_RATE_LIMIT: u32 = 240;
const DEFAULT_RECORDER_RATE_LIMIT: u32 = 60;
const DEFAULT_RATE_LIMIT_NAMESPACE: &str = "livraria:rl";
const DEFAULT_HIGH_VALUE_THRESHOLD: f64 = 10_000.0;
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (used when the rate limiter runs distributed)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// JWT secret key (minimum 64 characters)
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: usize,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to create missing tables on startup (sqlite/dev only)
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// Rate limiting: window size (seconds)
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_seconds: u64,

    /// Rate limiting: checkout session creation, per IP per window
    #[serde(default = "default_checkout_rate_limit")]
    pub checkout_rate_limit: u32,

    /// Rate limiting: inbound payment webhooks, per IP per window
    /// (server-to-server traffic runs far hotter than shoppers do)
    #[serde(default = "default_webhook_rate_limit")]
    pub webhook_rate_limit: u32,

    /// Rate limiting: client-side purchase recording, per user per window
    #[serde(default = "default_recorder_rate_limit")]
    pub recorder_rate_limit: u32,

    /// Enable the Redis-backed rate limiter for multi-instance deployments
    #[serde(default)]
    pub rate_limit_use_redis: bool,

    /// Namespace for rate limiter keys when Redis is enabled
    #[serde(default = "default_rate_limit_namespace")]
    pub rate_limit_namespace: String,

    /// Payment processor: checkout-session API base URL
    pub gateway_base_url: String,

    /// Payment processor: API key
    #[serde(default)]
    pub gateway_api_key: String,

    /// Payment processor: settlement currency (ISO 4217)
    #[serde(default = "default_gateway_currency")]
    pub gateway_currency: String,

    /// Payment processor: accepted payment method types
    #[serde(default = "default_gateway_payment_methods")]
    pub gateway_payment_methods: Vec<String>,

    /// Storefront URL the processor redirects to after payment
    pub checkout_success_url: String,

    /// Storefront URL the processor redirects to on cancellation
    pub checkout_cancel_url: String,

    /// Public URL of this service's webhook endpoint
    pub payment_webhook_url: String,

    /// Shared secret for verifying inbound webhook signatures (optional)
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Order totals at or above this value are flagged for fraud review
    #[serde(default = "default_high_value_threshold")]
    #[validate(custom = "validate_high_value_threshold")]
    pub high_value_threshold: f64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_jwt_secret() -> String {
    DEV_DEFAULT_JWT_SECRET.to_string()
}

fn default_jwt_expiration() -> usize {
    3600
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}

fn default_checkout_rate_limit() -> u32 {
    DEFAULT_CHECKOUT_RATE_LIMIT
}

fn default_webhook_rate_limit() -> u32 {
    DEFAULT_WEBHOOK_RATE_LIMIT
}

fn default_recorder_rate_limit() -> u32 {
    DEFAULT_RECORDER_RATE_LIMIT
}

fn default_rate_limit_namespace() -> String {
    DEFAULT_RATE_LIMIT_NAMESPACE.to_string()
}

fn default_gateway_currency() -> String {
    "BRL".to_string()
}

fn default_gateway_payment_methods() -> Vec<String> {
    vec!["card".to_string(), "pix".to_string()]
}

fn default_high_value_threshold() -> f64 {
    DEFAULT_HIGH_VALUE_THRESHOLD
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    if secret == DEV_DEFAULT_JWT_SECRET {
        // Tolerated in development, rejected by is_production_ready below.
        return Ok(());
    }
    if secret.chars().all(|c| c == secret.chars().next().unwrap_or(' ')) {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must not be a repeated character".into());
        return Err(err);
    }
    Ok(())
}

fn validate_high_value_threshold(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("high_value_threshold");
        err.message = Some("threshold must be a positive finite number".into());
        Err(err)
    }
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Guards against shipping development credentials.
    pub fn is_production_ready(&self) -> Result<(), String> {
        if self.is_development() {
            return Ok(());
        }
        if self.jwt_secret == DEV_DEFAULT_JWT_SECRET {
            return Err("jwt_secret still holds the development default".to_string());
        }
        if self.gateway_api_key.is_empty() {
            return Err("gateway_api_key is not configured".to_string());
        }
        Ok(())
    }
}

/// Loads configuration from `config/default.toml` (optional) layered with
/// `APP__*` environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config
        .validate()
        .map_err(|err| ConfigError::Message(format!("invalid configuration: {}", err)))?;

    info!(
        environment = %app_config.environment,
        port = app_config.port,
        "configuration loaded"
    );
    Ok(app_config)
}

/// Initializes the global tracing subscriber. `log_json` switches the
/// output to structured JSON lines for log aggregation.
pub fn init_tracing(log_level: &str, log_json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
