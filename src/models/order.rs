use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle states of a customer order.
///
/// Transitions are owned by `OrderService`; a no-op transition is always an
/// error, never silently ignored.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Preparing,
    Approved,
    Rejected,
    Shipped,
    Delivered,
}

/// A single ordered line. `total_price` is maintained as
/// `unit_price * quantity` at construction and on every mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl OrderItem {
    pub fn new(product_id: Uuid, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            quantity,
            unit_price,
            total_price: unit_price * Decimal::from(quantity),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Human-readable unique number assigned by the allocator.
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by the store on every write.
    pub version: i32,
}

impl Order {
    /// Sum of line totals. `total_amount` must always equal this.
    pub fn computed_total(&self) -> Decimal {
        self.items.iter().map(|item| item.total_price).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn line_total_is_quantity_times_unit_price() {
        let item = OrderItem::new(Uuid::new_v4(), 3, dec!(19.99));
        assert_eq!(item.total_price, dec!(59.97));
    }

    #[test]
    fn status_round_trips_through_snake_case() {
        assert_eq!(OrderStatus::Preparing.to_string(), "preparing");
        assert_eq!(
            OrderStatus::from_str("shipped").unwrap(),
            OrderStatus::Shipped
        );
    }
}
