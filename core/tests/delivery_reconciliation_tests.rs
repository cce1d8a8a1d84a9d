// tests/delivery_reconciliation_tests.rs
mod common;

use chrono::Duration;
use common::*;
use orderflow::model::ItemType;
use orderflow::ports::{ShipmentFare, ShipmentStatus};
use orderflow::{DeliveryUpdate, FlowError, OrderStatus};

fn status(s: &str) -> ShipmentStatus {
  ShipmentStatus {
    status: s.to_string(),
    fare: None,
  }
}

#[tokio::test]
async fn live_shipment_moves_order_and_items_out_for_delivery() {
  let scene = Scene::new();
  let world = &scene.world;
  let (order, _) = scene
    .order(
      "O3",
      OrderStatus::ReadyForPickUp,
      &[("LAMP-1", 1, ItemType::Buy), ("VASE-2", 1, ItemType::Secure)],
    )
    .await;
  world.patch_order(order.id, |o| o.delivery_partner_order_id = Some("SHP-O3".to_string())).await;
  world.partner.set_status("SHP-O3", "live", None);

  let reports = world.lifecycle.sweeper().tick().await;
  let forward = reports.iter().find(|r| r.job == "delivery-forward").unwrap();
  assert_eq!((forward.matched, forward.succeeded), (1, 1));

  let stored = world.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::OutForDelivery);
  assert_eq!(
    item_statuses(&world.items(order.id).await),
    vec![OrderStatus::OutForDelivery, OrderStatus::OutForDelivery]
  );
  // The skipped RIDER_ASSIGNED hop is still on record.
  assert_eq!(
    scene.history_of(&order).await,
    vec![OrderStatus::TransactionPending, OrderStatus::RiderAssigned, OrderStatus::OutForDelivery]
  );
}

#[tokio::test]
async fn applying_the_same_partner_state_twice_records_it_once() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-IDEM", OrderStatus::ReadyForPickUp).await;
  world.patch_order(order.id, |o| o.delivery_partner_order_id = Some("SHP-IDEM".to_string())).await;

  let first = world.lifecycle.apply_delivery_update("SHP-IDEM", &status("accepted")).await.unwrap();
  let second = world.lifecycle.apply_delivery_update("SHP-IDEM", &status("accepted")).await.unwrap();

  assert!(matches!(first, DeliveryUpdate::Applied { status: OrderStatus::RiderAssigned, hops: 1, .. }));
  assert!(matches!(second, DeliveryUpdate::Unchanged { status: OrderStatus::RiderAssigned, .. }));
  let history = scene.history_of(&order).await;
  assert_eq!(history.iter().filter(|s| **s == OrderStatus::RiderAssigned).count(), 1);
}

#[tokio::test]
async fn stale_partner_state_does_not_regress_the_order() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-STALE", OrderStatus::OutForDelivery).await;
  let before = world
    .patch_order(order.id, |o| o.delivery_partner_order_id = Some("SHP-STALE".to_string()))
    .await;

  let outcome = world.lifecycle.apply_delivery_update("SHP-STALE", &status("open")).await.unwrap();
  assert!(matches!(outcome, DeliveryUpdate::Unchanged { .. }));
  assert_eq!(world.order(order.id).await, before);
}

#[tokio::test]
async fn delivered_orders_carry_fare_and_settlement() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-DONE", OrderStatus::OutForDelivery).await;
  world.patch_order(order.id, |o| o.delivery_partner_order_id = Some("SHP-DONE".to_string())).await;
  let update = ShipmentStatus {
    status: "ended".to_string(),
    fare: Some(ShipmentFare {
      estimate: Some(4_500),
      actual: Some(5_000),
    }),
  };

  world.lifecycle.apply_delivery_update("SHP-DONE", &update).await.unwrap();

  let stored = world.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::Delivered);
  assert_eq!(stored.fare_details.actual, Some(5_000));
  let settlement = stored.settlement_details.unwrap();
  // 500.00 at the default 10% fee and 18% tax on the fee, 50.00 delivery.
  assert_eq!(settlement.platform_fee, 5_000);
  assert_eq!(settlement.tax_on_fee, 900);
  assert_eq!(settlement.payout, 50_000 - 5_000 - 900 - 5_000);
  let view = world.lifecycle.settlement(order.id).await.unwrap();
  assert_eq!(view.breakdown, settlement);
  assert!(!view.is_payout_done);
}

#[tokio::test]
async fn webhook_routes_unknown_ids_and_statuses_to_errors() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-WH", OrderStatus::ReadyForPickUp).await;
  world.patch_order(order.id, |o| o.delivery_partner_order_id = Some("SHP-WH".to_string())).await;

  let unknown_id = world.lifecycle.apply_delivery_update("SHP-NOPE", &status("live")).await;
  assert!(matches!(unknown_id, Err(FlowError::NotFound(_))));

  let unknown_status = world.lifecycle.apply_delivery_update("SHP-WH", &status("teleported")).await;
  assert!(matches!(unknown_status, Err(FlowError::Validation(_))));
  assert_eq!(world.order(order.id).await.status, OrderStatus::ReadyForPickUp);
}

#[tokio::test]
async fn partner_cancellation_cancels_order_and_items() {
  let scene = Scene::new();
  let world = &scene.world;
  let order = scene.simple_order("ORD-CXL", OrderStatus::RiderAssigned).await;
  world.patch_order(order.id, |o| o.delivery_partner_order_id = Some("SHP-CXL".to_string())).await;

  world.lifecycle.apply_delivery_update("SHP-CXL", &status("cancelled")).await.unwrap();

  assert_eq!(world.order(order.id).await.status, OrderStatus::OrderCancelled);
  assert_eq!(item_statuses(&world.items(order.id).await), vec![OrderStatus::OrderCancelled]);
}

#[tokio::test]
async fn cancelled_fare_refresh_only_touches_recent_cancellations() {
  let scene = Scene::new();
  let world = &scene.world;
  let now = world.now();
  let recent = scene.simple_order("ORD-CXL-NEW", OrderStatus::OrderCancelled).await;
  let old = scene.simple_order("ORD-CXL-OLD", OrderStatus::OrderCancelled).await;
  world
    .patch_order(recent.id, |o| {
      o.delivery_partner_order_id = Some("SHP-NEW".to_string());
      o.modified_at = now - Duration::minutes(30);
    })
    .await;
  world
    .patch_order(old.id, |o| {
      o.delivery_partner_order_id = Some("SHP-OLD".to_string());
      o.modified_at = now - Duration::hours(3);
    })
    .await;
  let charged = Some(ShipmentFare {
    estimate: None,
    actual: Some(2_000),
  });
  world.partner.set_status("SHP-NEW", "cancelled", charged.clone());
  world.partner.set_status("SHP-OLD", "cancelled", charged);

  let reports = world.lifecycle.sweeper().tick().await;
  let fares = reports.iter().find(|r| r.job == "delivery-cancelled-fare").unwrap();
  assert_eq!(fares.matched, 1);

  let refreshed = world.order(recent.id).await;
  assert_eq!(refreshed.status, OrderStatus::OrderCancelled);
  assert_eq!(refreshed.fare_details.actual, Some(2_000));
  assert_eq!(refreshed.status_history.len(), recent.status_history.len());
  assert_eq!(world.order(old.id).await.fare_details.actual, None);
}

#[tokio::test]
async fn reverse_shipment_updates_settle_the_return() {
  let scene = Scene::new();
  let world = &scene.world;
  let (order, _) = scene
    .order(
      "ORD-REV",
      OrderStatus::SecureReturnInitiated,
      &[("VASE-2", 1, ItemType::Secure)],
    )
    .await;
  world
    .patch_order(order.id, |o| {
      o.delivery_partner_order_id = Some("SHP-FWD".to_string());
      o.secure_dp_order_id = Some("SHP-REV".to_string());
    })
    .await;

  // Still on the road: nothing changes.
  let in_flight = world.lifecycle.apply_delivery_update("SHP-REV", &status("live")).await.unwrap();
  assert!(matches!(in_flight, DeliveryUpdate::Unchanged { .. }));

  world.lifecycle.apply_delivery_update("SHP-REV", &status("ended")).await.unwrap();
  assert_eq!(world.order(order.id).await.status, OrderStatus::SecureReturnCompleted);
  assert_eq!(item_statuses(&world.items(order.id).await), vec![OrderStatus::SecureReturnCompleted]);
}

#[tokio::test]
async fn reverse_sweep_records_partner_cancellation_as_failure() {
  let scene = Scene::new();
  let world = &scene.world;
  let (order, _) = scene
    .order(
      "ORD-REV-CXL",
      OrderStatus::SecureReturnInitiated,
      &[("VASE-2", 1, ItemType::Secure)],
    )
    .await;
  world.patch_order(order.id, |o| o.secure_dp_order_id = Some("SHP-RC".to_string())).await;
  world.partner.set_status("SHP-RC", "cancelled", None);

  let reports = world.lifecycle.sweeper().tick().await;
  let reverse = reports.iter().find(|r| r.job == "delivery-reverse").unwrap();
  assert_eq!(reverse.succeeded, 1);

  let stored = world.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::SecureReturnFailed);
  assert!(stored.secure_return_failure_reason.is_some());
  assert_eq!(item_statuses(&world.items(order.id).await), vec![OrderStatus::SecureReturnFailed]);
}
