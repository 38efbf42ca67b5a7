use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Invoice lifecycle states.
///
/// `Draft` and `Cancelled` sit outside the payment-derived range; the other
/// three are a pure function of the payment sum versus the invoice total.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Unpaid,
    PartiallyPaid,
    Paid,
    Cancelled,
}

/// Line items are copied from the source order at creation time and are
/// independent of the order's items thereafter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl InvoiceLineItem {
    pub fn new(
        product_id: Option<Uuid>,
        description: impl Into<String>,
        quantity: i32,
        unit_price: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            description: description.into(),
            quantity,
            unit_price,
            total_price: unit_price * Decimal::from(quantity),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    /// `PREFIX-YYYYMMDD-NNNN`, assigned by the allocator.
    pub invoice_number: String,
    /// At most one invoice may reference a given order.
    pub order_id: Option<Uuid>,
    /// Required for manual invoices that carry no order reference.
    pub customer_id: Option<Uuid>,
    pub status: InvoiceStatus,
    pub items: Vec<InvoiceLineItem>,
    pub total_amount: Decimal,
    pub invoice_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token; payment application retries on conflict.
    pub version: i32,
}

impl Invoice {
    pub fn computed_total(&self) -> Decimal {
        self.items.iter().map(|item| item.total_price).sum()
    }
}
