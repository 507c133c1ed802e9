use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::Set;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::ANONYMOUS_USER;
use crate::entities::purchase_history;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, ReconciliationSource};
use crate::models::{self, CartItem, MAX_ITEM_NAME_LEN, MAX_REFERENCE_LEN};
use crate::security::{self, SecurityEvent};
use crate::services::pending_purchases::PendingPurchaseService;
use crate::services::purchase_history::PurchaseHistoryService;

const MAX_RECORD_PRICE: Decimal = dec!(999999);

/// Result of processing one webhook delivery. Every outcome is acknowledged
/// to the processor; `Ignored` carries the internal reason code for
/// observability and never signals an error upstream.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed { records: usize },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum IgnoreReason {
    UnrecognizedPayload,
    MissingReference,
    ForeignReference,
    PaymentNotConfirmed,
    UnknownReference,
    AnonymousUser,
    AlreadyClaimed,
}

/// Converts confirmed payments into durable purchase-history records,
/// exactly once per checkout reference regardless of which trigger fires
/// first or how often the processor redelivers.
#[derive(Clone)]
pub struct ReconciliationService {
    pending: PendingPurchaseService,
    history: PurchaseHistoryService,
    event_sender: EventSender,
}

impl ReconciliationService {
    pub fn new(
        pending: PendingPurchaseService,
        history: PurchaseHistoryService,
        event_sender: EventSender,
    ) -> Self {
        Self {
            pending,
            history,
            event_sender,
        }
    }

    /// Webhook-side reconciliation. Ordering is load-bearing: the staged row
    /// is read, checked, then atomically claimed; only the claim winner
    /// inserts history, which is what makes processor redelivery and the
    /// race against the client-side recorder safe.
    #[instrument(skip(self, notification))]
    pub async fn reconcile_webhook(
        &self,
        notification: crate::webhook::WebhookNotification,
    ) -> Result<WebhookOutcome, ServiceError> {
        use crate::webhook::WebhookNotification;

        if matches!(notification, WebhookNotification::Unrecognized) {
            security::log_security_event(
                SecurityEvent::MalformedWebhookPayload,
                json!({ "endpoint": "payments/webhook" }),
            );
            return Ok(WebhookOutcome::Ignored(IgnoreReason::UnrecognizedPayload));
        }

        let reference = match notification.reference_id() {
            Some(raw) => security::sanitize_string(raw, MAX_REFERENCE_LEN),
            None => return Ok(WebhookOutcome::Ignored(IgnoreReason::MissingReference)),
        };
        if reference.is_empty() {
            return Ok(WebhookOutcome::Ignored(IgnoreReason::MissingReference));
        }
        // Not our naming convention: acknowledge without revealing whether
        // the id means anything to this system.
        if !models::is_checkout_reference(&reference) {
            security::log_security_event(
                SecurityEvent::ForeignWebhookReference,
                json!({ "reference_id": reference }),
            );
            return Ok(WebhookOutcome::Ignored(IgnoreReason::ForeignReference));
        }

        if !notification.is_paid() {
            debug!(reference_id = %reference, "payment not yet confirmed, awaiting later notification");
            return Ok(WebhookOutcome::Ignored(IgnoreReason::PaymentNotConfirmed));
        }

        // Absent row = already reconciled, expired, or never ours. This is
        // the idempotency backstop for at-least-once delivery.
        let Some(pending) = self.pending.find(&reference).await? else {
            debug!(reference_id = %reference, "no pending purchase, treating as already handled");
            return Ok(WebhookOutcome::Ignored(IgnoreReason::UnknownReference));
        };

        // Anonymous checkouts have no account to attach history to; only the
        // client-side path may complete them.
        if pending.user_id == ANONYMOUS_USER {
            return Ok(WebhookOutcome::Ignored(IgnoreReason::AnonymousUser));
        }

        let items: Vec<CartItem> = serde_json::from_value(pending.items.clone())
            .map_err(|err| ServiceError::SerializationError(err.to_string()))?;

        if !self.pending.claim(&reference).await? {
            debug!(reference_id = %reference, "pending purchase claimed by concurrent path");
            return Ok(WebhookOutcome::Ignored(IgnoreReason::AlreadyClaimed));
        }

        let records = map_to_history(pending.user_id, &reference, &items);
        let count = self.history.insert_batch(records).await?;

        let _ = self
            .event_sender
            .send(Event::PurchaseReconciled {
                order_id: reference.clone(),
                user_id: pending.user_id,
                records: count,
                source: ReconciliationSource::Webhook,
            })
            .await;

        info!(
            reference_id = %reference,
            records = count,
            "webhook reconciliation completed"
        );
        Ok(WebhookOutcome::Processed { records: count })
    }

    /// Client-side recording, invoked from the success-redirect page. The
    /// items arrive in the request body, so this path works even when the
    /// staged pending row was never written; the pre-insert existence check
    /// keeps it idempotent against itself and against the webhook path.
    /// Returns the number of records written (0 when already recorded).
    #[instrument(skip(self, items), fields(user_id = %user_id))]
    pub async fn record_client_purchase(
        &self,
        user_id: Uuid,
        reference_id: &str,
        items: &[CartItem],
    ) -> Result<usize, ServiceError> {
        let reference = security::sanitize_string(reference_id, MAX_REFERENCE_LEN);
        if reference.is_empty() {
            return Err(ServiceError::ValidationError(
                "referenceId is required".to_string(),
            ));
        }
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "items must not be empty".to_string(),
            ));
        }

        if self.history.exists_for_order(user_id, &reference).await? {
            debug!(reference_id = %reference, "purchase already recorded");
            return Ok(0);
        }

        let records = map_to_history(user_id, &reference, items);
        let count = self.history.insert_batch(records).await?;

        // Cleanup of the staging row, whether or not one existed. A failure
        // here leaves a stale row for the expiry job; the history write
        // above already succeeded.
        if let Err(err) = self.pending.claim(&reference).await {
            warn!(
                error = %err,
                reference_id = %reference,
                "failed to clear pending purchase after client recording"
            );
        }

        let _ = self
            .event_sender
            .send(Event::PurchaseReconciled {
                order_id: reference.clone(),
                user_id,
                records: count,
                source: ReconciliationSource::Client,
            })
            .await;

        info!(
            reference_id = %reference,
            records = count,
            "client-side purchase recording completed"
        );
        Ok(count)
    }
}

/// Maps cart lines to history rows. Price and quantity are re-clamped to
/// the accepted ranges even though they were validated at checkout time;
/// staged data is not trusted blindly.
fn map_to_history(
    user_id: Uuid,
    order_id: &str,
    items: &[CartItem],
) -> Vec<purchase_history::ActiveModel> {
    let purchased_at = Utc::now();
    items
        .iter()
        .map(|item| {
            let title = security::sanitize_string(&item.name, MAX_ITEM_NAME_LEN);
            let handle = item
                .handle
                .as_deref()
                .map(|value| security::sanitize_string(value, 128))
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| models::slugify(&title));

            purchase_history::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                order_id: Set(order_id.to_string()),
                product_handle: Set(handle),
                product_title: Set(title),
                product_image: Set(item
                    .image
                    .as_deref()
                    .map(|value| security::sanitize_string(value, 512))
                    .filter(|value| !value.is_empty())),
                product_price: Set(item.price.clamp(Decimal::ZERO, MAX_RECORD_PRICE)),
                quantity: Set(item.quantity.clamp(1, 100)),
                purchased_at: Set(purchased_at),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ActiveValue;

    fn item(price: Decimal, quantity: i32) -> CartItem {
        CartItem {
            name: "Livro A".to_string(),
            price,
            quantity,
            image: None,
            handle: None,
        }
    }

    fn unwrap_set<T: Clone + Into<sea_orm::Value>>(value: &ActiveValue<T>) -> T {
        match value {
            ActiveValue::Set(inner) => inner.clone(),
            _ => panic!("expected Set value"),
        }
    }

    #[test]
    fn mapping_clamps_out_of_range_values() {
        let user = Uuid::new_v4();
        let records = map_to_history(
            user,
            "order_1_deadbeef",
            &[item(dec!(5000000), 900), item(dec!(-10), 0)],
        );

        assert_eq!(unwrap_set(&records[0].product_price), MAX_RECORD_PRICE);
        assert_eq!(unwrap_set(&records[0].quantity), 100);
        assert_eq!(unwrap_set(&records[1].product_price), Decimal::ZERO);
        assert_eq!(unwrap_set(&records[1].quantity), 1);
    }

    #[test]
    fn mapping_defaults_handle_from_title() {
        let records = map_to_history(Uuid::new_v4(), "order_1_deadbeef", &[item(dec!(10), 1)]);
        assert_eq!(unwrap_set(&records[0].product_handle), "livro-a");
        assert_eq!(unwrap_set(&records[0].order_id), "order_1_deadbeef");
    }

    #[test]
    fn ignore_reason_codes_are_snake_case() {
        assert_eq!(IgnoreReason::UnrecognizedPayload.to_string(), "unrecognized_payload");
        assert_eq!(IgnoreReason::AnonymousUser.to_string(), "anonymous_user");
        assert_eq!(IgnoreReason::AlreadyClaimed.to_string(), "already_claimed");
    }
}
