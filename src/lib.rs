//! opsledger-api: business-operations core.
//!
//! Turns customer orders into invoices, reconciles payments against
//! invoices, and produces inventory replenishment alerts. The financial
//! document lifecycle (order -> invoice -> payment with derived status and
//! strict monetary invariants) lives in the document services; stock risk
//! classification and depletion forecasting live in the stock intelligence
//! service, which consults a rate-limited external prediction gateway only
//! when local sales history is insufficient.
//!
//! Transport, authentication and storage engines are collaborators, not
//! residents: persistence is consumed through [`store::DocumentStore`] and
//! the prediction provider through [`oracle::OracleClient`].

pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod oracle;
pub mod services;
pub mod store;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::oracle::{HttpOracleClient, OracleApiError, OracleGateway};
use crate::services::{
    InvoicingService, NumberAllocator, OrderService, PaymentService, StockIntelligenceService,
};
use crate::store::DocumentStore;

/// Composition root: wires the store, allocator, oracle gateway and the
/// document/stock services together.
pub struct AppServices {
    pub orders: OrderService,
    pub invoicing: InvoicingService,
    pub payments: PaymentService,
    pub stock: Arc<StockIntelligenceService>,
}

impl AppServices {
    /// Builds the full service graph over the given store.
    ///
    /// The oracle gateway is only constructed when provider credentials are
    /// configured; without them the stock engine quietly falls back to its
    /// local heuristics.
    pub fn build<S>(
        config: &AppConfig,
        store: Arc<S>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Result<Self, ServiceError>
    where
        S: DocumentStore + 'static,
    {
        let allocator = Arc::new(NumberAllocator::new(config.allocator.clone()));

        let gateway = match HttpOracleClient::new(&config.oracle) {
            Ok(client) => Some(Arc::new(OracleGateway::new(
                Arc::new(client),
                store.clone(),
                (&config.oracle).into(),
            ))),
            Err(OracleApiError::MissingCredentials) => None,
            Err(err) => return Err(ServiceError::OracleUnavailable(err.to_string())),
        };

        let stock = Arc::new(StockIntelligenceService::new(
            store.clone(),
            gateway,
            config.oracle.model.clone(),
            config.stock.clone(),
        ));

        let orders = OrderService::new(store.clone(), allocator.clone(), event_sender.clone());
        let invoicing = InvoicingService::new(
            store.clone(),
            allocator,
            Some(stock.clone()),
            event_sender.clone(),
        );
        let payments = PaymentService::new(store, event_sender);

        Ok(Self {
            orders,
            invoicing,
            payments,
            stock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn builds_without_oracle_credentials() {
        let config = AppConfig::default();
        let services = AppServices::build(&config, Arc::new(InMemoryStore::new()), None).unwrap();
        let alerts = services.stock.scan().await.unwrap();
        assert!(alerts.is_empty());
    }
}
