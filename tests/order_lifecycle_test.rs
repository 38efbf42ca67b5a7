//! End-to-end tests for the order state machine and its interaction with
//! invoice generation: preparing -> approved -> shipped -> delivered, with
//! every invalid transition rejected loudly.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;

use opsledger_api::errors::ServiceError;
use opsledger_api::models::{InvoiceStatus, OrderStatus};

#[tokio::test]
async fn full_lifecycle_preparing_to_delivered() {
    let app = TestApp::new();
    let order = app.order_with_line(2, dec!(50.00)).await;
    assert_eq!(order.status, OrderStatus::Preparing);
    assert_eq!(order.total_amount, dec!(100.00));

    let order = app.orders.approve_order(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Approved);

    let order = app.orders.mark_shipped(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);

    let order = app.orders.mark_delivered(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert!(order.delivered_at.is_some());
}

#[tokio::test]
async fn rejected_orders_cannot_progress() {
    let app = TestApp::new();
    let order = app.order_with_line(1, dec!(10)).await;

    let order = app
        .orders
        .reject_order(order.id, Some("out of stock".into()))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);

    assert_matches!(
        app.orders.approve_order(order.id).await.unwrap_err(),
        ServiceError::InvalidTransition { .. }
    );
    assert_matches!(
        app.orders.reject_order(order.id, None).await.unwrap_err(),
        ServiceError::InvalidTransition { .. }
    );
}

#[tokio::test]
async fn shipped_order_flows_into_a_draft_invoice() {
    let app = TestApp::new();
    let order = app.shipped_order(4, dec!(25.00)).await;

    let invoice = app.invoicing.create_from_order(order.id).await.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.total_amount, dec!(100.00));
    assert_eq!(invoice.items.len(), order.items.len());

    // Invoice items are copies; the order keeps its own lines.
    let reread = app.orders.get_order(order.id).await.unwrap();
    assert_eq!(reread.items[0].total_price, dec!(100.00));
}

#[tokio::test]
async fn create_from_order_requires_shipped_status() {
    let app = TestApp::new();
    let order = app.order_with_line(1, dec!(10)).await;

    let err = app.invoicing.create_from_order(order.id).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::ValidationError(msg) if msg.contains("must be shipped")
    );
}

#[tokio::test]
async fn deleting_an_invoiced_order_is_blocked_until_cancellation() {
    let app = TestApp::new();
    let order = app.shipped_order(1, dec!(10)).await;
    let invoice = app.invoicing.create_from_order(order.id).await.unwrap();

    assert_matches!(
        app.orders.delete_order(order.id).await.unwrap_err(),
        ServiceError::ValidationError(_)
    );

    // Cancelling the invoice frees the order for deletion.
    app.invoicing.cancel_invoice(invoice.id).await.unwrap();
    app.orders.delete_order(order.id).await.unwrap();
    assert_matches!(
        app.orders.get_order(order.id).await.unwrap_err(),
        ServiceError::NotFound(_)
    );
}

#[tokio::test]
async fn listing_is_paginated_newest_first() {
    let app = TestApp::new();
    for _ in 0..5 {
        app.order_with_line(1, dec!(1)).await;
    }

    let page = app.orders.list_orders(1, 2).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.orders.len(), 2);

    let last = app.orders.list_orders(3, 2).await.unwrap();
    assert_eq!(last.orders.len(), 1);
}

#[tokio::test]
async fn order_numbers_are_unique_fixed_width_digits() {
    let app = TestApp::new();
    let a = app.order_with_line(1, dec!(1)).await;
    let b = app.order_with_line(1, dec!(1)).await;

    assert_ne!(a.order_number, b.order_number);
    for number in [&a.order_number, &b.order_number] {
        assert_eq!(number.len(), 8);
        assert!(number.chars().all(|c| c.is_ascii_digit()));
    }
}
