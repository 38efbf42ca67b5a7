use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Invoice, InvoiceStatus, Payment, PaymentMethod};
use crate::store::{DocumentStore, StoreError};

/// Bounded retries when a concurrent payment bumps the invoice version
/// between our read and our write.
const MAX_CONFLICT_RETRIES: u32 = 3;

/// Derives the invoice status from the payment sum. Pure and idempotent;
/// `draft` and `cancelled` are outside this range and never produced here.
pub fn derive_status(total: Decimal, paid: Decimal) -> InvoiceStatus {
    if paid >= total {
        InvoiceStatus::Paid
    } else if paid > Decimal::ZERO {
        InvoiceStatus::PartiallyPaid
    } else {
        InvoiceStatus::Unpaid
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub payment_date: Option<DateTime<Utc>>,
    /// Free-form tag, validated against the known method set.
    pub method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// Applies payments to invoices and keeps the invoice status consistent
/// with the payment sum.
///
/// The read-recompute-write around every mutation is the system's critical
/// section: the store's version-checked invoice write makes it atomic, and
/// the service retries on conflict.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn DocumentStore>,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn DocumentStore>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            store,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(invoice_id = %invoice_id, amount = %request.amount))]
    pub async fn record_payment(
        &self,
        invoice_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<Payment, ServiceError> {
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::NonPositiveAmount);
        }
        let method = parse_method(&request.method)?;

        for _ in 0..MAX_CONFLICT_RETRIES {
            let invoice = self.payable_invoice(invoice_id).await?;
            let paid: Decimal = self
                .store
                .payments_for_invoice(invoice_id)
                .await?
                .iter()
                .map(|p| p.amount)
                .sum();
            let remaining = invoice.total_amount - paid;
            if request.amount > remaining {
                return Err(ServiceError::OverpaymentRejected { remaining });
            }

            let payment = Payment {
                id: Uuid::new_v4(),
                invoice_id,
                amount: request.amount,
                payment_date: request.payment_date.unwrap_or_else(Utc::now),
                method,
                reference: request.reference.clone(),
                notes: request.notes.clone(),
                created_at: Utc::now(),
            };

            let mut updated = invoice;
            updated.status = derive_status(updated.total_amount, paid + request.amount);
            match self.store.insert_payment(&payment, &updated).await {
                Ok(()) => {
                    info!(payment_id = %payment.id, status = %updated.status, "Payment recorded");
                    self.emit(Event::PaymentRecorded {
                        payment_id: payment.id,
                        invoice_id,
                        amount: payment.amount,
                    })
                    .await;
                    return Ok(payment);
                }
                Err(StoreError::VersionConflict(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(ServiceError::ConcurrentModification(invoice_id))
    }

    /// Re-validates the new amount against the remaining balance computed
    /// from the payment set excluding the one under edit.
    #[instrument(skip(self, request), fields(payment_id = %payment_id))]
    pub async fn update_payment(
        &self,
        payment_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<Payment, ServiceError> {
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::NonPositiveAmount);
        }
        let method = parse_method(&request.method)?;

        for _ in 0..MAX_CONFLICT_RETRIES {
            let existing = self.get_payment(payment_id).await?;
            let invoice = self.payable_invoice(existing.invoice_id).await?;
            let paid_others: Decimal = self
                .store
                .payments_for_invoice(invoice.id)
                .await?
                .iter()
                .filter(|p| p.id != payment_id)
                .map(|p| p.amount)
                .sum();
            let remaining = invoice.total_amount - paid_others;
            if request.amount > remaining {
                return Err(ServiceError::OverpaymentRejected { remaining });
            }

            let payment = Payment {
                amount: request.amount,
                payment_date: request.payment_date.unwrap_or(existing.payment_date),
                method,
                reference: request.reference.clone(),
                notes: request.notes.clone(),
                ..existing
            };

            let mut updated = invoice;
            updated.status = derive_status(updated.total_amount, paid_others + request.amount);
            match self.store.update_payment(&payment, &updated).await {
                Ok(()) => {
                    info!(payment_id = %payment.id, status = %updated.status, "Payment updated");
                    self.emit(Event::PaymentUpdated {
                        payment_id: payment.id,
                        invoice_id: payment.invoice_id,
                        amount: payment.amount,
                    })
                    .await;
                    return Ok(payment);
                }
                Err(StoreError::VersionConflict(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(ServiceError::ConcurrentModification(payment_id))
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn delete_payment(&self, payment_id: Uuid) -> Result<(), ServiceError> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let existing = self.get_payment(payment_id).await?;
            let invoice = self.payable_invoice(existing.invoice_id).await?;
            let paid_others: Decimal = self
                .store
                .payments_for_invoice(invoice.id)
                .await?
                .iter()
                .filter(|p| p.id != payment_id)
                .map(|p| p.amount)
                .sum();

            let mut updated = invoice;
            updated.status = derive_status(updated.total_amount, paid_others);
            match self.store.remove_payment(payment_id, &updated).await {
                Ok(()) => {
                    info!(payment_id = %payment_id, status = %updated.status, "Payment removed");
                    self.emit(Event::PaymentRemoved {
                        payment_id,
                        invoice_id: updated.id,
                    })
                    .await;
                    return Ok(());
                }
                Err(StoreError::VersionConflict(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(ServiceError::ConcurrentModification(payment_id))
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, ServiceError> {
        self.store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {}", payment_id)))
    }

    async fn payable_invoice(&self, invoice_id: Uuid) -> Result<Invoice, ServiceError> {
        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {}", invoice_id)))?;
        match invoice.status {
            InvoiceStatus::Draft | InvoiceStatus::Cancelled => {
                Err(ServiceError::ValidationError(format!(
                    "Cannot apply payments to a {} invoice",
                    invoice.status
                )))
            }
            _ => Ok(invoice),
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(err) = sender.send(event).await {
                warn!(error = %err, "Failed to send payment event");
            }
        }
    }
}

fn parse_method(tag: &str) -> Result<PaymentMethod, ServiceError> {
    PaymentMethod::from_str(tag).map_err(|_| {
        ServiceError::ValidationError(format!(
            "Unknown payment method '{}'; expected one of cash, credit_card, bank_transfer, check, online",
            tag
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_is_a_pure_function_of_the_payment_sum() {
        let total = dec!(10000);
        assert_eq!(derive_status(total, dec!(0)), InvoiceStatus::Unpaid);
        assert_eq!(derive_status(total, dec!(4000)), InvoiceStatus::PartiallyPaid);
        assert_eq!(derive_status(total, dec!(10000)), InvoiceStatus::Paid);
        assert_eq!(derive_status(total, dec!(12000)), InvoiceStatus::Paid);
    }

    #[test]
    fn derivation_is_idempotent() {
        let total = dec!(500);
        let paid = dec!(123.45);
        assert_eq!(
            derive_status(total, paid),
            derive_status(total, paid)
        );
    }

    #[test]
    fn boundary_one_unit_below_total_stays_partially_paid() {
        let total = dec!(100.00);
        assert_eq!(derive_status(total, dec!(99.99)), InvoiceStatus::PartiallyPaid);
        assert_eq!(derive_status(total, dec!(100.00)), InvoiceStatus::Paid);
    }

    #[test]
    fn unknown_method_tag_is_rejected() {
        assert!(parse_method("credit_card").is_ok());
        assert!(parse_method("barter").is_err());
    }
}
