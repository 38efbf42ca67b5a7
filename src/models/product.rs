use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only product subset consumed by the stock intelligence engine.
/// Product ownership lives elsewhere; the core only reads stock figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub stock_quantity: i32,
    pub critical_stock_level: i32,
    pub category: Option<String>,
}
