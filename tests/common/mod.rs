use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use opsledger_api::config::AllocatorConfig;
use opsledger_api::models::Order;
use opsledger_api::services::orders::{CreateOrderRequest, OrderItemRequest};
use opsledger_api::services::{
    InvoicingService, NumberAllocator, OrderService, PaymentService,
};
use opsledger_api::store::InMemoryStore;

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub orders: OrderService,
    pub invoicing: InvoicingService,
    pub payments: PaymentService,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let allocator = Arc::new(NumberAllocator::new(AllocatorConfig::default()));
        let orders = OrderService::new(store.clone(), allocator.clone(), None);
        let invoicing = InvoicingService::new(store.clone(), allocator, None, None);
        let payments = PaymentService::new(store.clone(), None);
        Self {
            store,
            orders,
            invoicing,
            payments,
        }
    }

    pub async fn order_with_line(&self, quantity: i32, unit_price: Decimal) -> Order {
        self.orders
            .create_order(CreateOrderRequest {
                customer_id: Uuid::new_v4(),
                items: vec![OrderItemRequest {
                    product_id: Uuid::new_v4(),
                    quantity,
                    unit_price,
                }],
                notes: None,
            })
            .await
            .expect("order creation")
    }

    pub async fn shipped_order(&self, quantity: i32, unit_price: Decimal) -> Order {
        let order = self.order_with_line(quantity, unit_price).await;
        self.orders.approve_order(order.id).await.expect("approve");
        self.orders.mark_shipped(order.id).await.expect("ship")
    }
}
