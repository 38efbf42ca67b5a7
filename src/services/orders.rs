use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Order, OrderItem, OrderStatus};
use crate::services::NumberAllocator;
use crate::store::DocumentStore;

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Owns the order half of the document state machine.
///
/// Transitions are strict: a transition from the wrong current state is an
/// `InvalidTransition` error, never a silent no-op.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn DocumentStore>,
    allocator: Arc<NumberAllocator>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        allocator: Arc<NumberAllocator>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            store,
            allocator,
            event_sender,
        }
    }

    /// Creates an order in `preparing`, with line totals recomputed and the
    /// order number assigned through the allocator.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, ServiceError> {
        request.validate()?;
        for item in &request.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(
                    "Quantity must be at least 1".to_string(),
                ));
            }
            if item.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Unit price cannot be negative".to_string(),
                ));
            }
        }

        let items: Vec<OrderItem> = request
            .items
            .iter()
            .map(|item| OrderItem::new(item.product_id, item.quantity, item.unit_price))
            .collect();
        let total_amount = items.iter().map(|item| item.total_price).sum();

        let order = Order {
            id: Uuid::new_v4(),
            order_number: String::new(), // assigned by the allocator
            customer_id: request.customer_id,
            status: OrderStatus::Preparing,
            items,
            total_amount,
            notes: request.notes,
            created_at: Utc::now(),
            approved_at: None,
            rejected_at: None,
            shipped_at: None,
            delivered_at: None,
            updated_at: None,
            version: 1,
        };

        let order = self.allocator.insert_order(self.store.as_ref(), order).await?;
        info!(order_id = %order.id, order_number = %order.order_number, "Order created");
        self.emit(Event::OrderCreated(order.id)).await;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order_id)))
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let (orders, total) = self.store.list_orders(page, per_page).await?;
        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// `preparing -> approved`. Any other current state is a conflict.
    #[instrument(skip(self))]
    pub async fn approve_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.transition(order_id, OrderStatus::Approved, |order| {
            order.approved_at = Some(Utc::now());
        })
        .await
    }

    /// Rejection is a status, not a deletion; it is blocked once the order
    /// has been approved (or moved further).
    #[instrument(skip(self))]
    pub async fn reject_order(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<Order, ServiceError> {
        self.transition(order_id, OrderStatus::Rejected, |order| {
            order.rejected_at = Some(Utc::now());
            if reason.is_some() {
                order.notes = reason.clone();
            }
        })
        .await
    }

    /// Warehouse shipment event: `approved -> shipped`.
    #[instrument(skip(self))]
    pub async fn mark_shipped(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.transition(order_id, OrderStatus::Shipped, |order| {
            order.shipped_at = Some(Utc::now());
        })
        .await
    }

    /// Warehouse delivery event: `shipped -> delivered`.
    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.transition(order_id, OrderStatus::Delivered, |order| {
            order.delivered_at = Some(Utc::now());
        })
        .await
    }

    /// Physical deletion, blocked while a live (non-cancelled) invoice
    /// references the order.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let order = self.get_order(order_id).await?;
        if let Some(invoice) = self.store.find_invoice_by_order(order.id).await? {
            if invoice.status != crate::models::InvoiceStatus::Cancelled {
                return Err(ServiceError::ValidationError(format!(
                    "Order {} has invoice {}; cancel the invoice before deleting the order",
                    order.order_number, invoice.invoice_number
                )));
            }
        }
        self.store.delete_order(order_id).await?;
        info!(order_id = %order_id, "Order deleted");
        self.emit(Event::OrderDeleted(order_id)).await;
        Ok(())
    }

    fn allowed_from(target: OrderStatus) -> &'static [OrderStatus] {
        match target {
            OrderStatus::Approved => &[OrderStatus::Preparing],
            OrderStatus::Rejected => &[OrderStatus::Preparing],
            OrderStatus::Shipped => &[OrderStatus::Approved],
            OrderStatus::Delivered => &[OrderStatus::Shipped],
            OrderStatus::Preparing => &[],
        }
    }

    async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        mutate: impl FnOnce(&mut Order),
    ) -> Result<Order, ServiceError> {
        let mut order = self.get_order(order_id).await?;
        if !Self::allowed_from(target).contains(&order.status) {
            return Err(ServiceError::InvalidTransition {
                from: order.status.to_string(),
                to: target.to_string(),
            });
        }

        let old_status = order.status;
        order.status = target;
        mutate(&mut order);
        let order = self.store.update_order(&order).await?;

        info!(order_id = %order.id, from = %old_status, to = %target, "Order status changed");
        self.emit(Event::OrderStatusChanged {
            order_id: order.id,
            old_status: old_status.to_string(),
            new_status: target.to_string(),
        })
        .await;
        Ok(order)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(err) = sender.send(event).await {
                warn!(error = %err, "Failed to send order event");
            }
        }
    }
}
