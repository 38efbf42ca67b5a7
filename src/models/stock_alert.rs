use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertType {
    OutOfStock,
    Critical,
    Low,
    Seasonal,
}

/// Ordinal risk ranking, used only for sorting and presentation.
/// Variant order defines the ordering: `Low < Medium < High < Critical`.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Derived, never persisted. Recomputed on every scan; the store is never
/// the system of record for alerts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockAlert {
    pub product_id: Uuid,
    pub product_name: String,
    pub current_stock: i32,
    pub critical_level: i32,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub recommended_action: String,
    pub estimated_depletion_days: i64,
    pub recommended_order_quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordinal() {
        assert!(AlertSeverity::Critical > AlertSeverity::High);
        assert!(AlertSeverity::High > AlertSeverity::Medium);
        assert!(AlertSeverity::Medium > AlertSeverity::Low);
    }
}
