use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DocumentStore, OracleAuditSink, StoreError};
use crate::models::{Invoice, OracleCallRecord, Order, OrderStatus, Payment, Product};

#[derive(Default)]
struct Tables {
    orders: HashMap<Uuid, Order>,
    order_numbers: HashSet<String>,
    invoices: HashMap<Uuid, Invoice>,
    invoice_numbers: HashSet<String>,
    invoice_by_order: HashMap<Uuid, Uuid>,
    payments: HashMap<Uuid, Payment>,
    products: HashMap<Uuid, Product>,
    oracle_records: Vec<OracleCallRecord>,
}

/// Reference in-process implementation of the persistence collaborator.
///
/// A single `RwLock` over all tables keeps every trait call atomic, which is
/// what gives the payment write path its transactional behavior here.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit trail, for tests and diagnostics.
    pub async fn oracle_records(&self) -> Vec<OracleCallRecord> {
        self.inner.read().await.oracle_records.clone()
    }
}

fn paginate<T: Clone>(mut items: Vec<T>, page: u64, per_page: u64) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let per_page = per_page.max(1);
    let start = page.saturating_sub(1) * per_page;
    if start >= total {
        return (Vec::new(), total);
    }
    let items = items
        .drain(..)
        .skip(start as usize)
        .take(per_page as usize)
        .collect();
    (items, total)
}

#[async_trait]
impl OracleAuditSink for InMemoryStore {
    async fn append_oracle_record(&self, record: OracleCallRecord) -> Result<(), StoreError> {
        self.inner.write().await.oracle_records.push(record);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        if tables.order_numbers.contains(&order.order_number) {
            return Err(StoreError::UniqueViolation(format!(
                "order_number '{}'",
                order.order_number
            )));
        }
        tables.order_numbers.insert(order.order_number.clone());
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn update_order(&self, order: &Order) -> Result<Order, StoreError> {
        let mut tables = self.inner.write().await;
        let stored = tables
            .orders
            .get(&order.id)
            .ok_or_else(|| StoreError::NotFound("order".into()))?;
        if stored.version != order.version {
            return Err(StoreError::VersionConflict(order.id));
        }
        let mut updated = order.clone();
        updated.version += 1;
        updated.updated_at = Some(Utc::now());
        tables.orders.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn delete_order(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        let order = tables
            .orders
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound("order".into()))?;
        tables.order_numbers.remove(&order.order_number);
        Ok(())
    }

    async fn list_orders(&self, page: u64, per_page: u64) -> Result<(Vec<Order>, u64), StoreError> {
        let mut orders: Vec<Order> = self.inner.read().await.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(orders, page, per_page))
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        if tables.invoice_numbers.contains(&invoice.invoice_number) {
            return Err(StoreError::UniqueViolation(format!(
                "invoice_number '{}'",
                invoice.invoice_number
            )));
        }
        if let Some(order_id) = invoice.order_id {
            if tables.invoice_by_order.contains_key(&order_id) {
                return Err(StoreError::UniqueViolation(format!(
                    "invoice for order '{}'",
                    order_id
                )));
            }
            tables.invoice_by_order.insert(order_id, invoice.id);
        }
        tables.invoice_numbers.insert(invoice.invoice_number.clone());
        tables.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, StoreError> {
        Ok(self.inner.read().await.invoices.get(&id).cloned())
    }

    async fn update_invoice(&self, invoice: &Invoice) -> Result<Invoice, StoreError> {
        let mut tables = self.inner.write().await;
        let stored = tables
            .invoices
            .get(&invoice.id)
            .ok_or_else(|| StoreError::NotFound("invoice".into()))?;
        if stored.version != invoice.version {
            return Err(StoreError::VersionConflict(invoice.id));
        }
        let mut updated = invoice.clone();
        updated.version += 1;
        updated.updated_at = Some(Utc::now());
        tables.invoices.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn delete_invoice(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        let invoice = tables
            .invoices
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound("invoice".into()))?;
        tables.invoice_numbers.remove(&invoice.invoice_number);
        if let Some(order_id) = invoice.order_id {
            tables.invoice_by_order.remove(&order_id);
        }
        tables.payments.retain(|_, p| p.invoice_id != id);
        Ok(())
    }

    async fn find_invoice_by_order(&self, order_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        let tables = self.inner.read().await;
        Ok(tables
            .invoice_by_order
            .get(&order_id)
            .and_then(|invoice_id| tables.invoices.get(invoice_id))
            .cloned())
    }

    async fn list_invoices(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<Invoice>, u64), StoreError> {
        let mut invoices: Vec<Invoice> =
            self.inner.read().await.invoices.values().cloned().collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(invoices, page, per_page))
    }

    async fn insert_payment(
        &self,
        payment: &Payment,
        invoice: &Invoice,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        let stored = tables
            .invoices
            .get(&invoice.id)
            .ok_or_else(|| StoreError::NotFound("invoice".into()))?;
        if stored.version != invoice.version {
            return Err(StoreError::VersionConflict(invoice.id));
        }
        let mut updated = invoice.clone();
        updated.version += 1;
        updated.updated_at = Some(Utc::now());
        tables.invoices.insert(updated.id, updated);
        tables.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.inner.read().await.payments.get(&id).cloned())
    }

    async fn update_payment(
        &self,
        payment: &Payment,
        invoice: &Invoice,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        if !tables.payments.contains_key(&payment.id) {
            return Err(StoreError::NotFound("payment".into()));
        }
        let stored = tables
            .invoices
            .get(&invoice.id)
            .ok_or_else(|| StoreError::NotFound("invoice".into()))?;
        if stored.version != invoice.version {
            return Err(StoreError::VersionConflict(invoice.id));
        }
        let mut updated = invoice.clone();
        updated.version += 1;
        updated.updated_at = Some(Utc::now());
        tables.invoices.insert(updated.id, updated);
        tables.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn remove_payment(&self, payment_id: Uuid, invoice: &Invoice) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        let stored = tables
            .invoices
            .get(&invoice.id)
            .ok_or_else(|| StoreError::NotFound("invoice".into()))?;
        if stored.version != invoice.version {
            return Err(StoreError::VersionConflict(invoice.id));
        }
        tables
            .payments
            .remove(&payment_id)
            .ok_or_else(|| StoreError::NotFound("payment".into()))?;
        let mut updated = invoice.clone();
        updated.version += 1;
        updated.updated_at = Some(Utc::now());
        tables.invoices.insert(updated.id, updated);
        Ok(())
    }

    async fn payments_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let mut payments: Vec<Payment> = self
            .inner
            .read()
            .await
            .payments
            .values()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(payments)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.inner.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> =
            self.inner.read().await.products.values().cloned().collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn quantity_sold_between(
        &self,
        product_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let tables = self.inner.read().await;
        let sold = tables
            .orders
            .values()
            .filter(|order| {
                matches!(
                    order.status,
                    OrderStatus::Approved | OrderStatus::Shipped | OrderStatus::Delivered
                ) && order.created_at >= from
                    && order.created_at < to
            })
            .flat_map(|order| order.items.iter())
            .filter(|item| item.product_id == product_id)
            .map(|item| item.quantity as i64)
            .sum();
        Ok(sold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderItem;
    use rust_decimal_macros::dec;

    fn sample_order(number: &str) -> Order {
        let item = OrderItem::new(Uuid::new_v4(), 2, dec!(10));
        Order {
            id: Uuid::new_v4(),
            order_number: number.to_string(),
            customer_id: Uuid::new_v4(),
            status: OrderStatus::Preparing,
            total_amount: item.total_price,
            items: vec![item],
            notes: None,
            created_at: Utc::now(),
            approved_at: None,
            rejected_at: None,
            shipped_at: None,
            delivered_at: None,
            updated_at: None,
            version: 1,
        }
    }

    #[tokio::test]
    async fn duplicate_order_number_is_a_unique_violation() {
        let store = InMemoryStore::new();
        store.insert_order(&sample_order("ORD-1")).await.unwrap();
        let err = store.insert_order(&sample_order("ORD-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = InMemoryStore::new();
        let order = sample_order("ORD-2");
        store.insert_order(&order).await.unwrap();

        let fresh = store.update_order(&order).await.unwrap();
        assert_eq!(fresh.version, 2);

        // The original copy still carries version 1.
        let err = store.update_order(&order).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict(_)));
    }

    #[tokio::test]
    async fn sold_quantity_only_counts_committed_orders_in_window() {
        let store = InMemoryStore::new();
        let product_id = Uuid::new_v4();

        let mut committed = sample_order("ORD-3");
        committed.status = OrderStatus::Shipped;
        committed.items = vec![OrderItem::new(product_id, 30, dec!(5))];
        store.insert_order(&committed).await.unwrap();

        let mut rejected = sample_order("ORD-4");
        rejected.status = OrderStatus::Rejected;
        rejected.items = vec![OrderItem::new(product_id, 99, dec!(5))];
        store.insert_order(&rejected).await.unwrap();

        let now = Utc::now();
        let sold = store
            .quantity_sold_between(product_id, now - chrono::Duration::days(30), now + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(sold, 30);
    }
}
