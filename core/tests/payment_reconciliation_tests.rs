// tests/payment_reconciliation_tests.rs
mod common;

use common::*;
use orderflow::model::ItemType;
use orderflow::{FlowError, OrderStatus};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn completed_payment_processes_order_clears_cart_and_takes_stock() {
  let scene = Scene::new();
  let world = &scene.world;
  let (order, _) = scene.order("O1", OrderStatus::TransactionPending, &[("LAMP-1", 2, ItemType::Buy)]).await;
  world.inventory.stock("LAMP-1", 10);
  world.cart.put(scene.parties.customer.id, "LAMP-1");
  world.cart.put(scene.parties.customer.id, "RUG-9");
  world.gateway.set_attempts("O1", &["COMPLETED"]);

  let became_paid = world.lifecycle.payments.reconcile_payment(order.id).await.unwrap();

  assert!(became_paid);
  let stored = world.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::TransactionProcessed);
  assert!(stored.is_paid());
  assert_eq!(stored.payment_mode.as_deref(), Some("UPI"));
  assert_eq!(stored.transaction_id.as_deref(), Some("TXN-O1-1"));
  assert_eq!(item_statuses(&world.items(order.id).await), vec![OrderStatus::TransactionProcessed]);
  assert_eq!(world.cart.lines(scene.parties.customer.id), vec!["RUG-9".to_string()]);
  assert_eq!(world.inventory.quantity("LAMP-1"), Some(8));
  let mails = world.notifier.sent_to(&scene.parties.seller.email);
  assert_eq!(mails.len(), 1);
  assert!(mails[0].subject.contains("O1"));
}

#[tokio::test]
async fn the_last_attempt_decides() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-RETRY", OrderStatus::TransactionPending).await;
  world.gateway.set_attempts("ORD-RETRY", &["FAILED", "COMPLETED"]);

  assert!(world.lifecycle.payments.reconcile_payment(order.id).await.unwrap());
  let stored = world.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::TransactionProcessed);
  assert_eq!(stored.transaction_id.as_deref(), Some("TXN-ORD-RETRY-2"));
}

#[tokio::test]
async fn failed_payment_runs_no_side_effects() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-F", OrderStatus::TransactionPending).await;
  world.inventory.stock("LAMP-1", 5);
  world.gateway.set_attempts("ORD-F", &["FAILED"]);

  assert!(!world.lifecycle.payments.reconcile_payment(order.id).await.unwrap());
  assert_eq!(world.order(order.id).await.status, OrderStatus::TransactionFailed);
  assert_eq!(world.inventory.quantity("LAMP-1"), Some(5));
  assert!(world.notifier.sent().is_empty());
}

#[tokio::test]
async fn pending_attempt_is_a_no_op() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-P", OrderStatus::TransactionPending).await;
  world.gateway.set_attempts("ORD-P", &["PENDING"]);

  assert!(!world.lifecycle.payments.reconcile_payment(order.id).await.unwrap());
  let stored = world.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::TransactionPending);
  assert_eq!(stored.version, order.version);
}

#[tokio::test]
async fn no_attempts_means_gateway_unavailable() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-EMPTY", OrderStatus::TransactionPending).await;
  world.gateway.set_attempts("ORD-EMPTY", &[]);

  let result = world.lifecycle.payments.reconcile_payment(order.id).await;
  assert!(matches!(result, Err(FlowError::GatewayUnavailable(_))));

  // Nothing scripted at all: an empty body.
  let silent = scene.simple_order("ORD-NONE", OrderStatus::TransactionPending).await;
  let result = world.lifecycle.payments.reconcile_payment(silent.id).await;
  assert!(matches!(result, Err(FlowError::GatewayUnavailable(_))));
}

#[tokio::test]
async fn already_paid_orders_do_not_reach_the_gateway() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-PAID", OrderStatus::TransactionProcessed).await;
  world.patch_order(order.id, |o| o.payment_status = Some("COMPLETED".to_string())).await;

  assert!(!world.lifecycle.payments.reconcile_payment(order.id).await.unwrap());
  assert_eq!(world.gateway.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_reconciliation_decrements_inventory_once() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-RACE", OrderStatus::TransactionPending).await;
  world.inventory.stock("LAMP-1", 10);
  world.gateway.set_attempts("ORD-RACE", &["COMPLETED"]);
  world.gateway.delay_status(Duration::from_millis(25));

  let payments = &world.lifecycle.payments;
  let (first, second) = tokio::join!(payments.reconcile_payment(order.id), payments.reconcile_payment(order.id));

  let winners = [first.unwrap(), second.unwrap()].iter().filter(|paid| **paid).count();
  assert_eq!(winners, 1);
  assert_eq!(world.gateway.status_calls.load(Ordering::SeqCst), 2);
  assert_eq!(world.inventory.decrement_calls.load(Ordering::SeqCst), 1);
  assert_eq!(world.inventory.quantity("LAMP-1"), Some(8));
  assert_eq!(world.notifier.sent().len(), 1);
  let history = scene.history_of(&order).await;
  assert_eq!(
    history.iter().filter(|s| **s == OrderStatus::TransactionProcessed).count(),
    1
  );
}

#[tokio::test]
async fn reconciliation_overtaken_mid_call_yields_to_the_winner() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-OVERTAKE", OrderStatus::TransactionPending).await;
  world.inventory.stock("LAMP-1", 10);
  world.gateway.set_attempts("ORD-OVERTAKE", &["COMPLETED"]);
  world.gateway.delay_status(Duration::from_millis(60));

  let payments = &world.lifecycle.payments;
  // The slow caller reads the pending order, then waits on the gateway while
  // a second caller settles the order and its items.
  let slow = payments.reconcile_payment(order.id);
  let fast = async {
    tokio::time::sleep(Duration::from_millis(10)).await;
    world.gateway.delay_status(Duration::ZERO);
    payments.reconcile_payment(order.id).await
  };
  let (slow, fast) = tokio::join!(slow, fast);

  assert!(fast.unwrap());
  assert!(!slow.unwrap());
  assert_eq!(world.inventory.decrement_calls.load(Ordering::SeqCst), 1);
  assert_eq!(world.inventory.quantity("LAMP-1"), Some(8));
  assert_eq!(world.order(order.id).await.status, OrderStatus::TransactionProcessed);
  assert_eq!(
    item_statuses(&world.items(order.id).await),
    vec![OrderStatus::TransactionProcessed]
  );
}

#[tokio::test]
async fn status_read_reconciles_pending_orders() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-READ", OrderStatus::TransactionPending).await;
  world.gateway.set_attempts("ORD-READ", &["COMPLETED"]);

  let seen = world.lifecycle.order_status(order.id).await.unwrap();
  assert_eq!(seen.status, OrderStatus::TransactionProcessed);

  // Gateway trouble does not break the read.
  let quiet = scene.simple_order("ORD-QUIET", OrderStatus::TransactionPending).await;
  let seen = world.lifecycle.order_status(quiet.id).await.unwrap();
  assert_eq!(seen.status, OrderStatus::TransactionPending);
}

#[tokio::test]
async fn payment_sweep_waits_out_the_quiet_period() {
  let scene = Scene::new();
  let world = &scene.world;
  let stale = scene.simple_order("ORD-STALE", OrderStatus::TransactionPending).await;
  let fresh = scene.simple_order("ORD-FRESH", OrderStatus::TransactionPending).await;
  let now = world.now();
  world.patch_order(fresh.id, |o| o.modified_at = now - chrono::Duration::minutes(2)).await;
  world.gateway.set_attempts("ORD-STALE", &["COMPLETED"]);
  world.gateway.set_attempts("ORD-FRESH", &["COMPLETED"]);

  let reports = world.lifecycle.sweeper().tick().await;
  let payment = reports.iter().find(|r| r.job == "payment").unwrap();
  assert_eq!(payment.matched, 1);
  assert_eq!(payment.succeeded, 1);
  assert_eq!(world.order(stale.id).await.status, OrderStatus::TransactionProcessed);
  assert_eq!(world.order(fresh.id).await.status, OrderStatus::TransactionPending);
}
