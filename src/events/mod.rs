use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the procurement core.
///
/// Events are published after the owning transaction commits; they are
/// informational and never load-bearing for consistency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PurchaseOrderCreated(Uuid),
    PurchaseOrderUpdated(Uuid),
    PurchaseOrderDeleted(Uuid),
    PurchaseOrderCancelled(Uuid),
    PurchaseOrderReceived {
        order_id: Uuid,
        po_number: String,
        movements: usize,
    },
    StockRestocked {
        variant_id: Uuid,
        quantity: i32,
        po_number: String,
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

    /// Sends an event, surfacing channel failures to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging (not propagating) channel failures.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Consumes events off the channel and logs them. Spawned from `main`.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::PurchaseOrderReceived {
                order_id,
                po_number,
                movements,
            } => {
                info!(
                    %order_id,
                    po_number,
                    movements,
                    "purchase order received"
                );
            }
            other => info!(event = ?other, "event processed"),
        }
    }
}
