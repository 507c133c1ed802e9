use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::warn;
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::handlers::common::{client_ip, enforce_rate_limit};
use crate::security::{self, SecurityEvent};
use crate::services::reconciliation::WebhookOutcome;
use crate::webhook;
use crate::AppState;

/// Acknowledgement body returned to the payment processor. `processed`
/// distinguishes an applied reconciliation from a handled-but-ignored
/// delivery; `reason` carries the internal code for the latter.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Receive asynchronous payment-status notifications from the processor.
///
/// Delivery is at-least-once, so every reachable outcome answers 200,
/// including unrecognized payloads, which would otherwise be retried
/// forever. Only unexpected internal failures return 500.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Notification acknowledged", body = WebhookAck),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let ip = client_ip(&headers);
    enforce_rate_limit(
        &state,
        &format!("webhook:ip:{}", ip),
        state.config.webhook_rate_limit,
        "payments_webhook",
    )
    .await?;

    // Signature verification only applies when a shared secret is
    // configured for the processor.
    if let Some(secret) = state.config.payment_webhook_secret.as_deref() {
        let payload = String::from_utf8_lossy(&body);
        let verified = headers
            .get("x-webhook-signature")
            .and_then(|value| value.to_str().ok())
            .map(|signature| security::verify_webhook_signature(&payload, signature, secret))
            .unwrap_or(false);

        if !verified {
            warn!("payment webhook signature verification failed");
            security::log_security_event(
                SecurityEvent::InvalidWebhookSignature,
                json!({ "identifier": ip, "endpoint": "payments_webhook" }),
            );
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let notification = webhook::parse(content_type, &body);

    let outcome = state
        .reconciliation_service
        .reconcile_webhook(notification)
        .await?;

    let ack = match outcome {
        WebhookOutcome::Processed { .. } => WebhookAck {
            received: true,
            processed: true,
            reason: None,
        },
        WebhookOutcome::Ignored(reason) => WebhookAck {
            received: true,
            processed: false,
            reason: Some(reason.to_string()),
        },
    };

    Ok(Json(ack))
}
