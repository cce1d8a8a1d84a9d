// tests/refund_workflow_tests.rs
mod common;

use common::*;
use orderflow::model::{ItemType, Requester};
use orderflow::testkit::RefundScript;
use orderflow::{FlowError, OrderStatus};
use std::sync::atomic::Ordering;
use uuid::Uuid;

#[tokio::test]
async fn rejected_order_with_failed_refund_ends_refund_failed_and_alerts_ops() {
  let scene = Scene::new();
  let world = &scene.world;
  let (order, _) = scene
    .order("O2", OrderStatus::TransactionProcessed, &[("LAMP-1", 1, ItemType::Buy)])
    .await;
  world.inventory.stock("LAMP-1", 7);
  world.gateway.script_refund(RefundScript::Respond("FAILED".to_string()));

  let outcome = world.lifecycle.reject_order(&scene.seller(), order.id, "damaged").await.unwrap();

  assert_eq!(outcome.status, OrderStatus::RefundFailed);
  assert!(outcome.refund_id.starts_with("REF-032026"));
  let stored = world.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::RefundFailed);
  assert_eq!(stored.rejection_remarks.as_deref(), Some("damaged"));
  assert_eq!(stored.refund_transaction_id.as_deref(), Some(outcome.refund_id.as_str()));
  assert_eq!(
    scene.history_of(&order).await,
    vec![
      OrderStatus::TransactionPending,
      OrderStatus::OrderRejected,
      OrderStatus::RefundRequested,
      OrderStatus::RefundFailed,
    ]
  );
  // Items stop at ORDER_REJECTED; the refund lane is order-only.
  assert_eq!(item_statuses(&world.items(order.id).await), vec![OrderStatus::OrderRejected]);
  assert_eq!(world.inventory.quantity("LAMP-1"), Some(0));

  let ops = &world.lifecycle.config().ops_alert_email;
  let alerts = world.notifier.sent_to(ops);
  assert_eq!(alerts.len(), 1);
  assert!(alerts[0].subject.contains("O2"));
}

#[tokio::test]
async fn completed_refund_ends_fully_refunded_without_alert() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-RF", OrderStatus::TransactionProcessed).await;
  world.gateway.script_refund(RefundScript::Respond("COMPLETED".to_string()));

  let outcome = world.lifecycle.reject_order(&scene.seller(), order.id, "out of stock").await.unwrap();

  assert_eq!(outcome.status, OrderStatus::FullyRefunded);
  assert!(world.notifier.sent().is_empty());
}

#[tokio::test]
async fn unsettled_refund_parks_in_pending_refund() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-PR", OrderStatus::TransactionProcessed).await;
  world.gateway.script_refund(RefundScript::Respond("PENDING".to_string()));

  let outcome = world.lifecycle.reject_order(&scene.seller(), order.id, "late").await.unwrap();
  assert_eq!(outcome.status, OrderStatus::PendingRefund);
}

#[tokio::test]
async fn silent_or_unreachable_gateway_leaves_refund_requested() {
  for script in [RefundScript::Silent, RefundScript::Unreachable] {
    let scene = Scene::new();
    let world = &scene.world;
    let order = scene.simple_order("ORD-SILENT", OrderStatus::TransactionProcessed).await;
    world.gateway.script_refund(script.clone());

    let outcome = world.lifecycle.reject_order(&scene.seller(), order.id, "no stock").await;

    let outcome = outcome.unwrap_or_else(|e| panic!("{:?} should still succeed, got {}", script, e));
    assert_eq!(outcome.status, OrderStatus::RefundRequested);
    assert_eq!(world.order(order.id).await.status, OrderStatus::RefundRequested);
    assert!(world.notifier.sent().is_empty());
  }
}

#[tokio::test]
async fn refund_is_requested_at_most_once() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-ONCE", OrderStatus::TransactionProcessed).await;
  world.gateway.script_refund(RefundScript::Silent);

  world.lifecycle.reject_order(&scene.seller(), order.id, "first").await.unwrap();
  let before = world.order(order.id).await;

  let again = world.lifecycle.reject_order(&scene.seller(), order.id, "second").await;

  assert!(matches!(
    again,
    Err(FlowError::InvalidTransition {
      from: OrderStatus::RefundRequested,
      to: OrderStatus::OrderRejected
    })
  ));
  assert_eq!(world.gateway.refund_calls.load(Ordering::SeqCst), 1);
  assert_eq!(world.order(order.id).await, before);
}

#[tokio::test]
async fn only_the_owning_seller_may_reject() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-OWN", OrderStatus::TransactionProcessed).await;

  let stranger = Requester::seller(Uuid::new_v4());
  let result = world.lifecycle.reject_order(&stranger, order.id, "nope").await;
  assert!(matches!(result, Err(FlowError::Forbidden(_))));

  let customer = world.lifecycle.reject_order(&scene.customer(), order.id, "nope").await;
  assert!(matches!(customer, Err(FlowError::Forbidden(_))));

  let blank = world.lifecycle.reject_order(&scene.seller(), order.id, "   ").await;
  assert!(matches!(blank, Err(FlowError::Validation(_))));

  assert_eq!(world.order(order.id).await.status, OrderStatus::TransactionProcessed);
  assert_eq!(world.gateway.refund_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unpaid_orders_cannot_be_rejected() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-UNPAID", OrderStatus::TransactionPending).await;

  let result = world.lifecycle.reject_order(&scene.seller(), order.id, "changed my mind").await;
  assert!(matches!(result, Err(FlowError::InvalidTransition { .. })));
  assert_eq!(world.gateway.refund_calls.load(Ordering::SeqCst), 0);
}
