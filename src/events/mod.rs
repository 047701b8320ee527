use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Domain events emitted by the services after a state change commits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    CustomerCreated(Uuid),
    CustomerDeactivated(Uuid),
    ProductCreated(Uuid),
    ProductDeactivated(Uuid),
    StockAdjusted {
        product_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
        reason: String,
    },
    LowStock {
        product_id: Uuid,
        quantity: i32,
        min_stock_level: i32,
    },
    PurchaseOrderCreated(Uuid),
    PurchaseOrderReceived(Uuid),
    SaleCreated {
        sale_id: Uuid,
        total_amount: Decimal,
    },
    SaleCompleted(Uuid),
    SaleCancelled(Uuid),
    PromotionApplied {
        promotion_id: Uuid,
        sale_id: Uuid,
        discount_amount: Decimal,
    },
    ReturnCreated(Uuid),
    ReturnCompleted {
        return_id: Uuid,
        refund_amount: Decimal,
    },
    VersionUploaded {
        version_id: Uuid,
        version: String,
    },
    DownloadCompleted {
        version_id: Uuid,
        session_id: Uuid,
    },
    ClientBlocked {
        client_id: String,
        endpoint: String,
        until: DateTime<Utc>,
    },
}

/// Sending half of the event channel, shared by every service.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Fire-and-forget: a full or closed channel never fails the caller.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.sender.try_send(event) {
            warn!(error = %err, "Dropping domain event");
        }
    }
}

/// Background consumer that turns events into log lines.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStock {
                product_id,
                quantity,
                min_stock_level,
            } => warn!(
                %product_id,
                quantity,
                min_stock_level,
                "Product stock is at or below its minimum level"
            ),
            Event::ClientBlocked {
                client_id,
                endpoint,
                until,
            } => warn!(%client_id, %endpoint, %until, "Client blocked by rate limiter"),
            other => match serde_json::to_string(other) {
                Ok(payload) => info!(event = %payload, "Domain event"),
                Err(err) => error!(error = %err, "Failed to serialize event"),
            },
        }
    }

    info!("Event processing loop stopped");
}
