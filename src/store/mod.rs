//! Persistence collaborator contract.
//!
//! The core never talks to a database directly; it consumes this trait for
//! atomic document reads/writes, uniqueness-constraint-backed inserts (the
//! number allocator retries on that signal rather than pre-checking), a
//! version-checked invoice write (the payment critical section), and the
//! sales-history query the stock engine needs.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Invoice, OracleCallRecord, Order, Payment, Product};

#[derive(thiserror::Error, Debug, Clone)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// Unique-constraint violation, e.g. a colliding order or invoice number.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Optimistic concurrency check failed for the given document.
    #[error("version conflict on {0}")]
    VersionConflict(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Append-only sink for oracle call audit records. The core writes these and
/// never reads them back; tests and operators inspect them out of band.
#[async_trait]
pub trait OracleAuditSink: Send + Sync {
    async fn append_oracle_record(&self, record: OracleCallRecord) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DocumentStore: OracleAuditSink + Send + Sync {
    // Orders. `insert_order` fails with `UniqueViolation` when the
    // order number collides; `update_order` is version-checked.
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn update_order(&self, order: &Order) -> Result<Order, StoreError>;
    async fn delete_order(&self, id: Uuid) -> Result<(), StoreError>;
    async fn list_orders(&self, page: u64, per_page: u64) -> Result<(Vec<Order>, u64), StoreError>;

    // Invoices. Same uniqueness and versioning rules as orders.
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError>;
    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, StoreError>;
    async fn update_invoice(&self, invoice: &Invoice) -> Result<Invoice, StoreError>;
    async fn delete_invoice(&self, id: Uuid) -> Result<(), StoreError>;
    async fn find_invoice_by_order(&self, order_id: Uuid) -> Result<Option<Invoice>, StoreError>;
    async fn list_invoices(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<Invoice>, u64), StoreError>;

    // Payments. Every payment mutation carries the parent invoice with its
    // expected version; the store applies both writes atomically and fails
    // with `VersionConflict` if the invoice moved underneath the caller.
    async fn insert_payment(&self, payment: &Payment, invoice: &Invoice)
        -> Result<(), StoreError>;
    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;
    async fn update_payment(&self, payment: &Payment, invoice: &Invoice)
        -> Result<(), StoreError>;
    async fn remove_payment(&self, payment_id: Uuid, invoice: &Invoice)
        -> Result<(), StoreError>;
    async fn payments_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<Payment>, StoreError>;

    // Products (read-side for the stock engine, upsert for seeding).
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Sum of ordered quantities for a product across committed orders
    /// (approved, shipped or delivered) created in `[from, to)`.
    async fn quantity_sold_between(
        &self,
        product_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, StoreError>;
}
