use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, instrument};

use crate::config::AllocatorConfig;
use crate::errors::ServiceError;
use crate::models::{Invoice, Order};
use crate::store::{DocumentStore, StoreError};

/// Allocates collision-free human-readable document numbers.
///
/// Candidates are random; uniqueness is enforced by the store's unique
/// constraint, and the allocator retries the insert only on that signal.
/// There is deliberately no check-then-insert pre-query: two callers can
/// pick the same candidate, and only the constraint closes that race.
pub struct NumberAllocator {
    config: AllocatorConfig,
}

impl NumberAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    /// Random numeric string of fixed width, e.g. `83651427`.
    pub fn order_candidate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.config.order_number_width)
            .map(|_| char::from(b'0' + rng.gen_range(0..10)))
            .collect()
    }

    /// `PREFIX-YYYYMMDD-NNNN`, e.g. `INV-20260830-4821`.
    pub fn invoice_candidate(&self, date: DateTime<Utc>) -> String {
        let mut rng = rand::thread_rng();
        format!(
            "{}-{}-{:04}",
            self.config.invoice_prefix,
            date.format("%Y%m%d"),
            rng.gen_range(0..10_000)
        )
    }

    /// Inserts the order under a freshly generated number, regenerating on a
    /// uniqueness violation up to the configured bound.
    #[instrument(skip(self, store, order), fields(order_id = %order.id))]
    pub async fn insert_order(
        &self,
        store: &dyn DocumentStore,
        mut order: Order,
    ) -> Result<Order, ServiceError> {
        for attempt in 1..=self.config.max_attempts {
            order.order_number = self.order_candidate();
            match store.insert_order(&order).await {
                Ok(()) => return Ok(order),
                Err(StoreError::UniqueViolation(what)) => {
                    debug!(attempt, %what, "order number collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ServiceError::AllocationExhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// Same bounded retry-on-conflict discipline for invoice numbers. A
    /// uniqueness violation on the order reference (a second invoice for the
    /// same order) is not retriable and surfaces as `DuplicateInvoice`.
    #[instrument(skip(self, store, invoice), fields(invoice_id = %invoice.id))]
    pub async fn insert_invoice(
        &self,
        store: &dyn DocumentStore,
        mut invoice: Invoice,
    ) -> Result<Invoice, ServiceError> {
        for attempt in 1..=self.config.max_attempts {
            invoice.invoice_number = self.invoice_candidate(invoice.invoice_date);
            match store.insert_invoice(&invoice).await {
                Ok(()) => return Ok(invoice),
                Err(StoreError::UniqueViolation(what)) if what.contains("invoice_number") => {
                    debug!(attempt, %what, "invoice number collision, regenerating");
                }
                Err(StoreError::UniqueViolation(_)) => {
                    return Err(ServiceError::DuplicateInvoice {
                        order_id: invoice.order_id.unwrap_or_default(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ServiceError::AllocationExhausted {
            attempts: self.config.max_attempts,
        })
    }
}
