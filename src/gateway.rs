//! Client for the external payment processor's hosted-checkout API.
//!
//! The processor exposes a single call this service depends on: create a
//! checkout session from sanitized line items and get back a hosted
//! payment-page URL plus a machine id. The seam is a trait so the checkout
//! service can be exercised against a stub.

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument};
use url::Url;

use crate::config::AppConfig;
use crate::models::CartItem;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid gateway configuration: {0}")]
    Config(String),
    #[error("request to payment processor failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment processor returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("payment processor response did not include a checkout URL")]
    MissingRedirectUrl,
}

/// Everything the checkout service knows about the session being opened.
#[derive(Debug, Clone)]
pub struct CheckoutSessionSpec {
    pub reference_id: String,
    pub items: Vec<CartItem>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
}

/// The processor's answer: a hosted payment page and its machine id.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        spec: CheckoutSessionSpec,
    ) -> Result<GatewaySession, GatewayError>;
}

/// Connection settings for the hosted-checkout API.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub api_key: String,
    pub currency: String,
    pub payment_method_types: Vec<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub webhook_url: String,
}

impl GatewaySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.gateway_base_url.clone(),
            api_key: config.gateway_api_key.clone(),
            currency: config.gateway_currency.clone(),
            payment_method_types: config.gateway_payment_methods.clone(),
            success_url: config.checkout_success_url.clone(),
            cancel_url: config.checkout_cancel_url.clone(),
            webhook_url: config.payment_webhook_url.clone(),
        }
    }
}

#[derive(Serialize)]
struct WireLineItem {
    name: String,
    /// Amount in minor currency units (centavos).
    unit_amount: i64,
    quantity: i32,
}

#[derive(Serialize)]
struct WireCustomer<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateSessionBody<'a> {
    reference_id: &'a str,
    currency: &'a str,
    line_items: Vec<WireLineItem>,
    success_url: String,
    cancel_url: &'a str,
    webhook_url: &'a str,
    payment_method_types: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    customer: Option<WireCustomer<'a>>,
}

#[derive(Deserialize)]
struct CreateSessionReply {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

/// Production gateway speaking HTTPS to the processor.
pub struct HttpCheckoutGateway {
    client: reqwest::Client,
    endpoint: Url,
    settings: GatewaySettings,
}

impl HttpCheckoutGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| GatewayError::Config(format!("gateway_base_url: {}", err)))?;
        let endpoint = base
            .join("/v1/checkout/sessions")
            .map_err(|err| GatewayError::Config(format!("gateway_base_url: {}", err)))?;
        // Validate the redirect target up front so a bad deploy fails fast.
        Url::parse(&settings.success_url)
            .map_err(|err| GatewayError::Config(format!("checkout_success_url: {}", err)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            settings,
        })
    }

    fn success_url_for(&self, reference_id: &str) -> String {
        match Url::parse(&self.settings.success_url) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("reference_id", reference_id);
                url.to_string()
            }
            // Validated at construction; fall back to the raw value.
            Err(_) => self.settings.success_url.clone(),
        }
    }
}

fn to_minor_units(price: Decimal) -> i64 {
    (price * Decimal::from(100)).round().to_i64().unwrap_or(0)
}

#[async_trait]
impl CheckoutGateway for HttpCheckoutGateway {
    #[instrument(skip(self, spec), fields(reference_id = %spec.reference_id))]
    async fn create_checkout_session(
        &self,
        spec: CheckoutSessionSpec,
    ) -> Result<GatewaySession, GatewayError> {
        let body = CreateSessionBody {
            reference_id: &spec.reference_id,
            currency: &self.settings.currency,
            line_items: spec
                .items
                .iter()
                .map(|item| WireLineItem {
                    name: item.name.clone(),
                    unit_amount: to_minor_units(item.price),
                    quantity: item.quantity,
                })
                .collect(),
            success_url: self.success_url_for(&spec.reference_id),
            cancel_url: &self.settings.cancel_url,
            webhook_url: &self.settings.webhook_url,
            payment_method_types: &self.settings.payment_method_types,
            customer: match (spec.customer_email.as_deref(), spec.customer_name.as_deref()) {
                (None, None) => None,
                (email, name) => Some(WireCustomer { email, name }),
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "payment processor rejected checkout session");
            return Err(GatewayError::Status { status, body });
        }

        let reply: CreateSessionReply = response.json().await?;
        let url = reply.url.ok_or(GatewayError::MissingRedirectUrl)?;

        Ok(GatewaySession { id: reply.id, url })
    }
}
