use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Domain events emitted by the mutating services. Consumers (notification
/// delivery, projections, webhooks) live outside this crate and drain the
/// receiving end of the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StockAdjusted {
        tenant_id: Uuid,
        material_id: Uuid,
        transaction_id: Uuid,
        transaction_type: String,
        quantity_before: Decimal,
        quantity_after: Decimal,
    },
    ProductionCommitted {
        tenant_id: Uuid,
        product_id: Uuid,
        quantity: Decimal,
        production_run_id: Uuid,
    },
    RecipeCreated {
        tenant_id: Uuid,
        recipe_id: Uuid,
        product_id: Uuid,
    },
    RecipeActivated {
        tenant_id: Uuid,
        recipe_id: Uuid,
        product_id: Uuid,
    },
    MaterialArchived {
        tenant_id: Uuid,
        material_id: Uuid,
    },
    MaterialRestored {
        tenant_id: Uuid,
        material_id: Uuid,
    },
    StockAlertRaised {
        tenant_id: Uuid,
        alert_id: Uuid,
        material_id: Uuid,
        severity: String,
    },
    StockAlertStatusChanged {
        tenant_id: Uuid,
        alert_id: Uuid,
        status: String,
        changed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when no consumer is
    /// attached. Mutations must not be rolled back because event delivery
    /// lagged.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event delivery failed: {}", e);
        }
    }
}

/// Builds a channel pair sized for request-scoped bursts.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}
