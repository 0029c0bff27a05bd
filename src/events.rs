//! Fire-and-forget event channel feeding the notification sink.
//!
//! Services emit events only after their transaction has committed, and a
//! failed send is logged and dropped: notification failures must never mask
//! or revert the primary operation's success.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the core workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    WorkOrderCreated { work_order_id: Uuid, number: String },
    WorkOrderStatusChanged {
        work_order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    WorkOrderCancelled { work_order_id: Uuid, number: String },
    LineFulfilled { line_id: Uuid, item_id: Uuid, quantity: i32 },
    ProductionProgressReported {
        line_id: Uuid,
        additional_qty: i32,
        produced_qty: i32,
    },
    PurchaseOrderReceived { purchase_order_id: Uuid, number: String },
    WasteRecycled { waste_id: Uuid, item_id: Uuid, quantity: i32 },
    StockBelowMinimum {
        item_id: Uuid,
        code: String,
        current_stock: i32,
        stock_minimum: i32,
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

    /// Sends an event, logging and swallowing any failure.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "Dropped event: notification channel closed");
        }
    }
}

/// Drains the event channel, handing each event to the notification sink.
/// Here that sink is the structured log; deployments attach their own
/// consumer instead.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "Processing event");
    }
}

/// Builds a connected sender/processor pair with a bounded queue.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}
