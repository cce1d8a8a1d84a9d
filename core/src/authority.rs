// orderflow/src/authority.rs

//! The State Transition Authority: the only code path that changes an order's
//! or an item's status.
//!
//! Staging (`stage`, `stage_items`) validates against the transition table and
//! appends history in memory; `persist` writes the order plus changed items in
//! one guarded commit. `transition` does both and only hands the caller the new
//! state once the commit has succeeded, so a rejected or conflicting transition
//! leaves the caller's copies untouched.

use crate::error::{FlowError, FlowResult};
use crate::model::{Actor, Order, OrderItem, StatusEntry};
use crate::ports::Clock;
use crate::status::OrderStatus;
use crate::store::OrderStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct TransitionAuthority {
  store: Arc<dyn OrderStore>,
  clock: Arc<dyn Clock>,
}

impl TransitionAuthority {
  pub fn new(store: Arc<dyn OrderStore>, clock: Arc<dyn Clock>) -> Self {
    Self { store, clock }
  }

  pub fn store(&self) -> &Arc<dyn OrderStore> {
    &self.store
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  /// History timestamps never go backwards, even if the wall clock does.
  fn stamp(&self, history: &[StatusEntry]) -> DateTime<Utc> {
    let now = self.clock.now();
    match history.last() {
      Some(last) if last.at > now => last.at,
      _ => now,
    }
  }

  pub fn check(from: OrderStatus, to: OrderStatus) -> FlowResult<()> {
    if from.can_transition_to(to) {
      Ok(())
    } else {
      Err(FlowError::InvalidTransition { from, to })
    }
  }

  /// Validates and applies `target` to the in-memory order.
  pub fn stage(&self, order: &mut Order, target: OrderStatus, actor: &Actor) -> FlowResult<()> {
    Self::check(order.status, target)?;
    let at = self.stamp(&order.status_history);
    order.status = target;
    order.status_history.push(StatusEntry {
      status: target,
      actor: actor.clone(),
      at,
    });
    order.modified_at = at;
    Ok(())
  }

  /// Applies `target` to every item in `items`, or to none of them.
  pub fn stage_items(&self, items: &mut [OrderItem], target: OrderStatus, actor: &Actor) -> FlowResult<()> {
    if !target.applies_to_items() {
      return Ok(());
    }
    for item in items.iter() {
      Self::check(item.status, target)?;
    }
    for item in items.iter_mut() {
      let at = self.stamp(&item.status_history);
      item.status = target;
      item.status_history.push(StatusEntry {
        status: target,
        actor: actor.clone(),
        at,
      });
    }
    Ok(())
  }

  /// Commits `order` and `items`, refreshing `modified_at` and adopting the
  /// bumped version on success.
  pub async fn persist(&self, order: &mut Order, items: &[OrderItem]) -> FlowResult<()> {
    let mut pending = order.clone();
    pending.modified_at = pending.modified_at.max(self.clock.now());
    let committed = self.store.commit(&pending, items).await?;
    *order = committed;
    Ok(())
  }

  /// Moves the order and the given items to `target` and persists them with
  /// any other field changes already made on `order`.
  #[instrument(
    name = "TransitionAuthority::transition",
    skip_all,
    fields(order_id = %order.id, from = %order.status, to = %target, actor = %actor, items = items.len()),
    err(Display)
  )]
  pub async fn transition(
    &self,
    order: &mut Order,
    items: &mut [OrderItem],
    target: OrderStatus,
    actor: &Actor,
  ) -> FlowResult<()> {
    let mut staged_order = order.clone();
    let mut staged_items = items.to_vec();
    self.stage(&mut staged_order, target, actor)?;
    self.stage_items(&mut staged_items, target, actor)?;
    self.persist(&mut staged_order, &staged_items).await?;
    debug!(version = staged_order.version, "Transition committed.");
    *order = staged_order;
    items.clone_from_slice(&staged_items);
    Ok(())
  }

  /// Walks the shortest legal chain from the current status to `target`,
  /// recording every hop, and persists once. Returns the number of hops.
  pub async fn advance(
    &self,
    order: &mut Order,
    items: &mut [OrderItem],
    target: OrderStatus,
    actor: &Actor,
  ) -> FlowResult<usize> {
    let path = order
      .status
      .forward_path(target)
      .ok_or(FlowError::InvalidTransition { from: order.status, to: target })?;
    if path.is_empty() {
      return Ok(0);
    }
    let mut staged_order = order.clone();
    let mut staged_items = items.to_vec();
    for hop in &path {
      self.stage(&mut staged_order, *hop, actor)?;
      // Items lagging behind the order (or already ahead of it) are left
      // where they are rather than failing the whole hop.
      for item in staged_items.iter_mut().filter(|i| i.status.can_transition_to(*hop)) {
        self.stage_items(std::slice::from_mut(item), *hop, actor)?;
      }
    }
    self.persist(&mut staged_order, &staged_items).await?;
    *order = staged_order;
    items.clone_from_slice(&staged_items);
    Ok(path.len())
  }
}
