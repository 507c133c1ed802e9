use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Which reconciliation path converted a pending purchase into history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationSource {
    Webhook,
    Client,
}

/// Domain events emitted by the checkout and reconciliation services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutSessionCreated {
        reference_id: String,
        user_id: Uuid,
        item_count: usize,
        total: Decimal,
    },
    HighValueCheckout {
        reference_id: String,
        total: Decimal,
    },
    PurchaseReconciled {
        order_id: String,
        user_id: Uuid,
        records: usize,
        source: ReconciliationSource,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, surfacing each event to the log stream. The
/// consumer is intentionally side-effect free; downstream integrations
/// subscribe here when they exist.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::CheckoutSessionCreated {
                reference_id,
                user_id,
                item_count,
                total,
            } => info!(
                reference_id = %reference_id,
                user_id = %user_id,
                item_count,
                total = %total,
                "checkout session created"
            ),
            Event::HighValueCheckout {
                reference_id,
                total,
            } => info!(
                reference_id = %reference_id,
                total = %total,
                "high-value checkout flagged for review"
            ),
            Event::PurchaseReconciled {
                order_id,
                user_id,
                records,
                source,
            } => info!(
                order_id = %order_id,
                user_id = %user_id,
                records,
                source = ?source,
                "purchase history recorded"
            ),
        }
    }
    info!("event channel closed");
}
