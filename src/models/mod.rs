pub mod invoice;
pub mod oracle_call;
pub mod order;
pub mod payment;
pub mod product;
pub mod stock_alert;

pub use invoice::{Invoice, InvoiceLineItem, InvoiceStatus};
pub use oracle_call::{OracleCallCategory, OracleCallOutcome, OracleCallRecord};
pub use order::{Order, OrderItem, OrderStatus};
pub use payment::{Payment, PaymentMethod};
pub use product::Product;
pub use stock_alert::{AlertSeverity, AlertType, StockAlert};
