use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Invoice, InvoiceLineItem, InvoiceStatus, OrderStatus, Payment, StockAlert};
use crate::services::{NumberAllocator, StockIntelligenceService};
use crate::store::DocumentStore;

/// Payment terms applied when no due date is given: net 30.
const DEFAULT_PAYMENT_TERM_DAYS: i64 = 30;

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceItemRequest {
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    /// Manual invoices may omit the order, but then must name a customer.
    pub order_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Invoice must contain at least one item"))]
    pub items: Vec<InvoiceItemRequest>,
    pub due_date: Option<chrono::DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Invoice plus its fixed aggregate: recorded payments.
#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub payments: Vec<Payment>,
}

/// Result of approving a draft invoice. Stock advisories are informational
/// output computed after the state change; they never gate it.
#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceApproval {
    pub invoice: Invoice,
    pub stock_advisories: Vec<StockAlert>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<Invoice>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Owns the invoice half of the document state machine.
#[derive(Clone)]
pub struct InvoicingService {
    store: Arc<dyn DocumentStore>,
    allocator: Arc<NumberAllocator>,
    stock: Option<Arc<StockIntelligenceService>>,
    event_sender: Option<Arc<EventSender>>,
}

impl InvoicingService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        allocator: Arc<NumberAllocator>,
        stock: Option<Arc<StockIntelligenceService>>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            store,
            allocator,
            stock,
            event_sender,
        }
    }

    /// Creates a manual invoice in `draft`. A customer reference is required
    /// when the invoice is not tied to an order.
    #[instrument(skip(self, request))]
    pub async fn create_invoice(
        &self,
        request: CreateInvoiceRequest,
    ) -> Result<Invoice, ServiceError> {
        request.validate()?;
        if request.order_id.is_none() && request.customer_id.is_none() {
            return Err(ServiceError::ValidationError(
                "Manual invoices must reference a customer".to_string(),
            ));
        }
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

        let items: Vec<InvoiceLineItem> = request
            .items
            .iter()
            .map(|item| {
                InvoiceLineItem::new(
                    item.product_id,
                    item.description.clone(),
                    item.quantity,
                    item.unit_price,
                )
            })
            .collect();

        self.persist_draft(
            request.order_id,
            request.customer_id,
            items,
            request.due_date,
            request.notes,
        )
        .await
    }

    /// Synthesizes an invoice from a shipped order, copying its line items.
    ///
    /// Line totals are recomputed as `quantity x unit_price` rather than
    /// copied, so rounding drift in the source cannot leak in. At most one
    /// invoice may exist per order.
    #[instrument(skip(self))]
    pub async fn create_from_order(&self, order_id: Uuid) -> Result<Invoice, ServiceError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order_id)))?;

        if order.status != OrderStatus::Shipped {
            return Err(ServiceError::ValidationError(format!(
                "Order {} must be shipped before invoicing (current status: {})",
                order.order_number, order.status
            )));
        }
        if self.store.find_invoice_by_order(order_id).await?.is_some() {
            return Err(ServiceError::DuplicateInvoice { order_id });
        }

        let mut items = Vec::with_capacity(order.items.len());
        for order_item in &order.items {
            let description = match self.store.get_product(order_item.product_id).await? {
                Some(product) => product.name,
                None => format!("Product {}", order_item.product_id),
            };
            items.push(InvoiceLineItem::new(
                Some(order_item.product_id),
                description,
                order_item.quantity,
                order_item.unit_price,
            ));
        }

        self.persist_draft(Some(order_id), Some(order.customer_id), items, None, None)
            .await
    }

    /// `draft -> unpaid`, with advisory stock alerts for the invoiced
    /// products returned alongside. Advisory failure never blocks approval.
    #[instrument(skip(self))]
    pub async fn approve_invoice(&self, invoice_id: Uuid) -> Result<InvoiceApproval, ServiceError> {
        let mut invoice = self.get_raw(invoice_id).await?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(ServiceError::InvalidTransition {
                from: invoice.status.to_string(),
                to: InvoiceStatus::Unpaid.to_string(),
            });
        }

        invoice.status = InvoiceStatus::Unpaid;
        let invoice = self.store.update_invoice(&invoice).await?;
        info!(invoice_id = %invoice.id, invoice_number = %invoice.invoice_number, "Invoice approved");
        self.emit(Event::InvoiceStatusChanged {
            invoice_id: invoice.id,
            old_status: InvoiceStatus::Draft.to_string(),
            new_status: InvoiceStatus::Unpaid.to_string(),
        })
        .await;

        let stock_advisories = self.advisories_for(&invoice).await;
        Ok(InvoiceApproval {
            invoice,
            stock_advisories,
        })
    }

    /// `draft -> cancelled`. Invoices past draft cannot be cancelled.
    #[instrument(skip(self))]
    pub async fn cancel_invoice(&self, invoice_id: Uuid) -> Result<Invoice, ServiceError> {
        let mut invoice = self.get_raw(invoice_id).await?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(ServiceError::InvalidTransition {
                from: invoice.status.to_string(),
                to: InvoiceStatus::Cancelled.to_string(),
            });
        }

        invoice.status = InvoiceStatus::Cancelled;
        let invoice = self.store.update_invoice(&invoice).await?;
        info!(invoice_id = %invoice.id, "Invoice cancelled");
        self.emit(Event::InvoiceStatusChanged {
            invoice_id: invoice.id,
            old_status: InvoiceStatus::Draft.to_string(),
            new_status: InvoiceStatus::Cancelled.to_string(),
        })
        .await;
        Ok(invoice)
    }

    /// Physical deletion, allowed only while the invoice is still a draft.
    #[instrument(skip(self))]
    pub async fn delete_invoice(&self, invoice_id: Uuid) -> Result<(), ServiceError> {
        let invoice = self.get_raw(invoice_id).await?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(ServiceError::ValidationError(format!(
                "Only draft invoices can be deleted (current status: {})",
                invoice.status
            )));
        }
        self.store.delete_invoice(invoice_id).await?;
        info!(invoice_id = %invoice_id, "Invoice deleted");
        self.emit(Event::InvoiceDeleted(invoice_id)).await;
        Ok(())
    }

    /// Fixed aggregate shape: the invoice with its payments.
    #[instrument(skip(self))]
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<InvoiceDetail, ServiceError> {
        let invoice = self.get_raw(invoice_id).await?;
        let payments = self.store.payments_for_invoice(invoice_id).await?;
        Ok(InvoiceDetail { invoice, payments })
    }

    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<InvoiceListResponse, ServiceError> {
        let (invoices, total) = self.store.list_invoices(page, per_page).await?;
        Ok(InvoiceListResponse {
            invoices,
            total,
            page,
            per_page,
        })
    }

    async fn get_raw(&self, invoice_id: Uuid) -> Result<Invoice, ServiceError> {
        self.store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {}", invoice_id)))
    }

    async fn persist_draft(
        &self,
        order_id: Option<Uuid>,
        customer_id: Option<Uuid>,
        items: Vec<InvoiceLineItem>,
        due_date: Option<chrono::DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<Invoice, ServiceError> {
        let now = Utc::now();
        let total_amount = items.iter().map(|item| item.total_price).sum();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            invoice_number: String::new(), // assigned by the allocator
            order_id,
            customer_id,
            status: InvoiceStatus::Draft,
            items,
            total_amount,
            invoice_date: now,
            due_date: due_date.unwrap_or(now + Duration::days(DEFAULT_PAYMENT_TERM_DAYS)),
            notes,
            created_at: now,
            updated_at: None,
            version: 1,
        };

        let invoice = self
            .allocator
            .insert_invoice(self.store.as_ref(), invoice)
            .await?;
        info!(invoice_id = %invoice.id, invoice_number = %invoice.invoice_number, "Invoice created");
        self.emit(Event::InvoiceCreated(invoice.id)).await;
        Ok(invoice)
    }

    async fn advisories_for(&self, invoice: &Invoice) -> Vec<StockAlert> {
        let Some(stock) = &self.stock else {
            return Vec::new();
        };
        let product_ids: Vec<Uuid> = invoice.items.iter().filter_map(|i| i.product_id).collect();
        match stock.alerts_for_products(&product_ids).await {
            Ok(alerts) => alerts,
            Err(err) => {
                warn!(error = %err, invoice_id = %invoice.id, "Stock advisories unavailable");
                Vec::new()
            }
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(err) = sender.send(event).await {
                warn!(error = %err, "Failed to send invoice event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocatorConfig;
    use crate::services::orders::{CreateOrderRequest, OrderItemRequest, OrderService};
    use crate::store::InMemoryStore;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn services() -> (OrderService, InvoicingService) {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let allocator = Arc::new(NumberAllocator::new(AllocatorConfig::default()));
        let orders = OrderService::new(store.clone(), allocator.clone(), None);
        let invoicing = InvoicingService::new(store, allocator, None, None);
        (orders, invoicing)
    }

    async fn shipped_order(orders: &OrderService) -> crate::models::Order {
        let order = orders
            .create_order(CreateOrderRequest {
                customer_id: Uuid::new_v4(),
                items: vec![OrderItemRequest {
                    product_id: Uuid::new_v4(),
                    quantity: 4,
                    unit_price: dec!(25),
                }],
                notes: None,
            })
            .await
            .unwrap();
        orders.approve_order(order.id).await.unwrap();
        orders.mark_shipped(order.id).await.unwrap()
    }

    #[tokio::test]
    async fn create_from_order_requires_shipped_status() {
        let (orders, invoicing) = services();
        let order = orders
            .create_order(CreateOrderRequest {
                customer_id: Uuid::new_v4(),
                items: vec![OrderItemRequest {
                    product_id: Uuid::new_v4(),
                    quantity: 1,
                    unit_price: dec!(10),
                }],
                notes: None,
            })
            .await
            .unwrap();

        let err = invoicing.create_from_order(order.id).await.unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("must be shipped"));
    }

    #[tokio::test]
    async fn create_from_order_copies_lines_and_applies_net_30() {
        let (orders, invoicing) = services();
        let order = shipped_order(&orders).await;

        let invoice = invoicing.create_from_order(order.id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.order_id, Some(order.id));
        assert_eq!(invoice.items.len(), 1);
        assert_eq!(invoice.items[0].total_price, dec!(100));
        assert_eq!(invoice.total_amount, dec!(100));
        assert_eq!((invoice.due_date - invoice.invoice_date).num_days(), 30);
    }

    #[tokio::test]
    async fn second_invoice_for_same_order_is_rejected() {
        let (orders, invoicing) = services();
        let order = shipped_order(&orders).await;

        invoicing.create_from_order(order.id).await.unwrap();
        let err = invoicing.create_from_order(order.id).await.unwrap_err();
        assert_matches!(err, ServiceError::DuplicateInvoice { order_id } if order_id == order.id);
    }

    #[tokio::test]
    async fn manual_invoice_requires_customer() {
        let (_, invoicing) = services();
        let err = invoicing
            .create_invoice(CreateInvoiceRequest {
                order_id: None,
                customer_id: None,
                items: vec![InvoiceItemRequest {
                    product_id: None,
                    description: "Consulting".into(),
                    quantity: 1,
                    unit_price: dec!(500),
                }],
                due_date: None,
                notes: None,
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("customer"));
    }

    #[tokio::test]
    async fn approve_moves_draft_to_unpaid_exactly_once() {
        let (orders, invoicing) = services();
        let order = shipped_order(&orders).await;
        let invoice = invoicing.create_from_order(order.id).await.unwrap();

        let approval = invoicing.approve_invoice(invoice.id).await.unwrap();
        assert_eq!(approval.invoice.status, InvoiceStatus::Unpaid);
        assert!(approval.stock_advisories.is_empty());

        let err = invoicing.approve_invoice(invoice.id).await.unwrap_err();
        assert_matches!(err, ServiceError::InvalidTransition { .. });
    }

    #[tokio::test]
    async fn only_draft_invoices_can_be_cancelled_or_deleted() {
        let (orders, invoicing) = services();
        let order = shipped_order(&orders).await;
        let invoice = invoicing.create_from_order(order.id).await.unwrap();
        invoicing.approve_invoice(invoice.id).await.unwrap();

        assert_matches!(
            invoicing.cancel_invoice(invoice.id).await.unwrap_err(),
            ServiceError::InvalidTransition { .. }
        );
        assert_matches!(
            invoicing.delete_invoice(invoice.id).await.unwrap_err(),
            ServiceError::ValidationError(_)
        );
    }

    #[tokio::test]
    async fn order_with_invoice_cannot_be_deleted() {
        let (orders, invoicing) = services();
        let order = shipped_order(&orders).await;
        invoicing.create_from_order(order.id).await.unwrap();

        let err = orders.delete_order(order.id).await.unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("cancel the invoice"));
    }
}
