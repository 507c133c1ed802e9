use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{CheckoutGateway, CheckoutSessionSpec};
use crate::models::{self, CartItem};
use crate::security::{self, SecurityEvent};
use crate::services::pending_purchases::PendingPurchaseService;

/// Request body for opening a checkout session.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "items": [{"name": "Livro A", "price": 29.90, "quantity": 2}],
    "customerEmail": "leitor@example.com",
    "customerName": "Leitor Exemplo"
}))]
pub struct CreateCheckoutSessionRequest {
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
}

/// What the storefront needs to redirect the shopper to the hosted payment
/// page and to correlate the eventual outcome.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "url": "https://pay.processor.example/session/abc123",
    "checkoutId": "sess_abc123",
    "referenceId": "order_1730546400123_9f2ab4c1"
}))]
pub struct CheckoutSessionResponse {
    pub url: String,
    pub checkout_id: String,
    pub reference_id: String,
}

/// Builds payment-processor checkout sessions from validated carts, staging
/// a pending purchase for later reconciliation.
#[derive(Clone)]
pub struct CheckoutService {
    pending: PendingPurchaseService,
    gateway: Arc<dyn CheckoutGateway>,
    event_sender: EventSender,
    high_value_threshold: Decimal,
}

impl CheckoutService {
    pub fn new(
        pending: PendingPurchaseService,
        gateway: Arc<dyn CheckoutGateway>,
        event_sender: EventSender,
        high_value_threshold: Decimal,
    ) -> Self {
        Self {
            pending,
            gateway,
            event_sender,
            high_value_threshold,
        }
    }

    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_session(
        &self,
        user_id: Uuid,
        request: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSessionResponse, ServiceError> {
        let items = models::validate_items(&request.items)?;

        let total: Decimal = items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum();

        let reference_id = models::generate_reference_id();

        if total > self.high_value_threshold {
            // Informational flag for fraud review; the checkout proceeds.
            security::log_security_event(
                SecurityEvent::HighValueOrder,
                json!({ "reference_id": reference_id, "total": total.to_string() }),
            );
            let _ = self
                .event_sender
                .send(Event::HighValueCheckout {
                    reference_id: reference_id.clone(),
                    total,
                })
                .await;
        }

        // Stage the pending purchase before contacting the processor: if the
        // shopper bounces back from the hosted page before this row exists,
        // reconciliation would have nothing to consolidate against. Failure
        // is non-fatal since the client-side recorder is the fallback path.
        if let Err(err) = self.pending.create(&reference_id, user_id, &items).await {
            warn!(
                error = %err,
                reference_id = %reference_id,
                "failed to stage pending purchase; relying on client-side recording"
            );
        }

        let session = self
            .gateway
            .create_checkout_session(CheckoutSessionSpec {
                reference_id: reference_id.clone(),
                items: items.clone(),
                customer_email: request
                    .customer_email
                    .as_deref()
                    .map(|value| security::sanitize_string(value, 128))
                    .filter(|value| !value.is_empty()),
                customer_name: request
                    .customer_name
                    .as_deref()
                    .map(|value| security::sanitize_string(value, 128))
                    .filter(|value| !value.is_empty()),
            })
            .await
            .map_err(|err| {
                // Full detail stays server-side; callers get a retryable
                // generic message.
                error!(error = %err, reference_id = %reference_id, "checkout session creation failed");
                ServiceError::ExternalServiceError("payment processor unavailable".to_string())
            })?;

        let _ = self
            .event_sender
            .send(Event::CheckoutSessionCreated {
                reference_id: reference_id.clone(),
                user_id,
                item_count: items.len(),
                total,
            })
            .await;

        info!(
            reference_id = %reference_id,
            checkout_id = %session.id,
            "checkout session created"
        );

        Ok(CheckoutSessionResponse {
            url: session.url,
            checkout_id: session.id,
            reference_id,
        })
    }
}
