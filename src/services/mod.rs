pub mod invoicing;
pub mod number_allocator;
pub mod orders;
pub mod payments;
pub mod stock_alerts;

pub use invoicing::InvoicingService;
pub use number_allocator::NumberAllocator;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use stock_alerts::StockIntelligenceService;
