use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Domain events emitted after successful lifecycle changes.
///
/// Delivery is best-effort: services log a warning when a send fails and the
/// business operation still succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderDeleted(Uuid),

    InvoiceCreated(Uuid),
    InvoiceStatusChanged {
        invoice_id: Uuid,
        old_status: String,
        new_status: String,
    },
    InvoiceDeleted(Uuid),

    PaymentRecorded {
        payment_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
    },
    PaymentUpdated {
        payment_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
    },
    PaymentRemoved {
        payment_id: Uuid,
        invoice_id: Uuid,
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

    /// Convenience constructor returning the sender plus its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}
