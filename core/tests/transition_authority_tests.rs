// tests/transition_authority_tests.rs
mod common;

use common::*;
use orderflow::model::{Actor, ItemType};
use orderflow::{FlowError, OrderStatus, TransitionAuthority};

fn authority(scene: &Scene) -> TransitionAuthority {
  TransitionAuthority::new(scene.world.store.clone(), scene.world.clock.clone())
}

#[tokio::test]
async fn one_bad_item_blocks_the_whole_transition() {
  let scene = Scene::new();
  let (mut order, mut items) = scene
    .order(
      "ORD-MIXED",
      OrderStatus::ReadyForPickUp,
      &[("LAMP-1", 1, ItemType::Buy), ("VASE-2", 1, ItemType::Secure)],
    )
    .await;
  items[1].status = OrderStatus::Delivered;
  let before = (order.clone(), items.clone());

  let result = authority(&scene)
    .transition(&mut order, &mut items, OrderStatus::RiderAssigned, &Actor::system("test"))
    .await;

  assert!(matches!(
    result,
    Err(FlowError::InvalidTransition {
      from: OrderStatus::Delivered,
      to: OrderStatus::RiderAssigned
    })
  ));
  assert_eq!((order, items), before);
  assert_eq!(scene.world.order(before.0.id).await, before.0);
}

#[tokio::test]
async fn stale_copies_lose_to_the_first_writer() {
  let scene = Scene::new();
  let authority = authority(&scene);
  let (order, _) = scene
    .order("ORD-CAS", OrderStatus::TransactionProcessed, &[("LAMP-1", 1, ItemType::Buy)])
    .await;
  let mut sweep_copy = order.clone();
  let mut seller_copy = order.clone();

  authority
    .transition(&mut seller_copy, &mut [], OrderStatus::OrderAccepted, &scene.seller().actor())
    .await
    .unwrap();
  let lost = authority
    .transition(&mut sweep_copy, &mut [], OrderStatus::OrderRejected, &Actor::system("test"))
    .await;

  assert!(matches!(lost, Err(FlowError::Conflict { .. })));
  assert_eq!(sweep_copy, order);
  assert_eq!(scene.world.order(order.id).await.status, OrderStatus::OrderAccepted);
}

#[tokio::test]
async fn history_stays_ordered_when_the_clock_steps_back() {
  let scene = Scene::new();
  let authority = authority(&scene);
  let (mut order, _) = scene
    .order("ORD-CLOCK", OrderStatus::TransactionPending, &[("LAMP-1", 1, ItemType::Buy)])
    .await;

  scene.world.clock.advance(chrono::Duration::days(2));
  authority
    .transition(&mut order, &mut [], OrderStatus::TransactionProcessed, &Actor::system("test"))
    .await
    .unwrap();
  scene.world.clock.advance(chrono::Duration::hours(-5));
  authority
    .transition(&mut order, &mut [], OrderStatus::OrderAccepted, &Actor::system("test"))
    .await
    .unwrap();

  let stamps: Vec<_> = order.status_history.iter().map(|e| e.at).collect();
  assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
  assert_eq!(
    order.last_reached(OrderStatus::OrderAccepted),
    order.last_reached(OrderStatus::TransactionProcessed)
  );
}
