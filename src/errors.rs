use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::StoreError;

/// Crate-wide service error type.
///
/// Validation and conflict variants are caller-correctable and carry enough
/// detail to act on (remaining balance, offending states). Persistence
/// failures are fatal to the operation that hit them.
#[derive(thiserror::Error, Debug, Clone, Serialize, Deserialize)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: cannot move from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("An invoice already exists for order {order_id}")]
    DuplicateInvoice { order_id: Uuid },

    #[error("Payment amount must be greater than zero")]
    NonPositiveAmount,

    #[error("Payment exceeds remaining balance of {remaining}")]
    OverpaymentRejected { remaining: Decimal },

    #[error("Number allocation exhausted after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    #[error("Prediction service unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Concurrent modification of {0}")]
    ConcurrentModification(Uuid),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::UniqueViolation(what) => {
                ServiceError::ValidationError(format!("Duplicate value for {}", what))
            }
            StoreError::VersionConflict(id) => ServiceError::ConcurrentModification(id),
            StoreError::Backend(msg) => ServiceError::PersistenceError(msg),
        }
    }
}
