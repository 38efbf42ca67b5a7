//! Development runner: wires the full service graph over the in-memory
//! store and walks one order through to a paid invoice, then prints the
//! stock alert summary. Useful for eyeballing logs and config overrides
//! without a persistence backend.

use std::sync::Arc;

use anyhow::Context;
use rust_decimal_macros::dec;
use tracing::info;
use uuid::Uuid;

use opsledger_api as api;

use api::events::EventSender;
use api::services::orders::{CreateOrderRequest, OrderItemRequest};
use api::services::payments::RecordPaymentRequest;
use api::store::InMemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = api::config::AppConfig::load().context("loading configuration")?;
    api::config::init_tracing("info");

    let (event_sender, mut event_rx) = EventSender::channel(1024);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(?event, "event");
        }
    });

    let store = Arc::new(InMemoryStore::new());
    let services = api::AppServices::build(&config, store, Some(Arc::new(event_sender)))
        .context("building services")?;

    let order = services
        .orders
        .create_order(CreateOrderRequest {
            customer_id: Uuid::new_v4(),
            items: vec![OrderItemRequest {
                product_id: Uuid::new_v4(),
                quantity: 3,
                unit_price: dec!(49.90),
            }],
            notes: Some("walkthrough".to_string()),
        })
        .await?;
    services.orders.approve_order(order.id).await?;
    services.orders.mark_shipped(order.id).await?;

    let invoice = services.invoicing.create_from_order(order.id).await?;
    let approval = services.invoicing.approve_invoice(invoice.id).await?;
    services
        .payments
        .record_payment(
            approval.invoice.id,
            RecordPaymentRequest {
                amount: approval.invoice.total_amount,
                payment_date: None,
                method: "bank_transfer".to_string(),
                reference: Some("DEMO-1".to_string()),
                notes: None,
            },
        )
        .await?;

    let detail = services.invoicing.get_invoice(invoice.id).await?;
    info!(
        invoice_number = %detail.invoice.invoice_number,
        status = %detail.invoice.status,
        "walkthrough complete"
    );

    let summary = services.stock.alert_summary().await?;
    info!(total = summary.total, critical = summary.critical, "stock alert summary");
    Ok(())
}
