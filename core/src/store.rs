// orderflow/src/store.rs

//! Order/OrderItem persistence.
//!
//! The store is the only shared mutable resource in the engine. Writes go
//! through [`OrderStore::commit`], which persists an order together with any
//! changed items under an optimistic-concurrency guard: the commit succeeds only
//! if the stored `version` still equals the version the caller read. Losers get
//! [`FlowError::Conflict`] and must re-read before deciding anything.

use crate::error::{FlowError, FlowResult};
use crate::model::{Order, OrderItem};
use crate::status::OrderStatus;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Selection used by the background sweeps. Soft-deleted orders never match.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
  pub statuses: Vec<OrderStatus>,
  /// Only orders whose `modified_at` is strictly earlier.
  pub modified_before: Option<DateTime<Utc>>,
  /// Only orders whose `modified_at` is at or after this instant.
  pub modified_since: Option<DateTime<Utc>>,
  pub with_partner_order: bool,
  pub with_secure_partner_order: bool,
  /// Only returns whose pickup slot has opened by this business-local time.
  pub return_due_by: Option<NaiveDateTime>,
  pub limit: Option<usize>,
}

impl OrderQuery {
  pub fn in_statuses(statuses: &[OrderStatus]) -> Self {
    OrderQuery {
      statuses: statuses.to_vec(),
      ..Default::default()
    }
  }

  pub fn matches(&self, order: &Order) -> bool {
    !order.is_deleted
      && (self.statuses.is_empty() || self.statuses.contains(&order.status))
      && self.modified_before.map_or(true, |t| order.modified_at < t)
      && self.modified_since.map_or(true, |t| order.modified_at >= t)
      && (!self.with_partner_order || order.delivery_partner_order_id.is_some())
      && (!self.with_secure_partner_order || order.secure_dp_order_id.is_some())
      && self.return_due_by.map_or(true, |at| crate::secure_return::is_due(order, at))
  }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  /// Stores a brand-new order. Checkout owns creation; the lifecycle only
  /// needs this for imports and fixtures.
  async fn insert(&self, order: &Order, items: &[OrderItem]) -> FlowResult<()>;

  async fn order(&self, id: Uuid) -> FlowResult<Option<Order>>;

  async fn items(&self, order_id: Uuid) -> FlowResult<Vec<OrderItem>>;

  async fn find(&self, query: &OrderQuery) -> FlowResult<Vec<Order>>;

  async fn find_by_partner_order_id(&self, partner_order_id: &str) -> FlowResult<Option<Order>>;

  async fn find_by_secure_partner_order_id(&self, partner_order_id: &str) -> FlowResult<Option<Order>>;

  /// Persists `order` and `items` atomically if the stored version equals
  /// `order.version`. Returns the order as stored (version bumped).
  async fn commit(&self, order: &Order, items: &[OrderItem]) -> FlowResult<Order>;
}

/// Loads an order or fails with `NotFound`.
pub async fn require_order(store: &dyn OrderStore, id: Uuid) -> FlowResult<Order> {
  store
    .order(id)
    .await?
    .filter(|order| !order.is_deleted)
    .ok_or_else(|| FlowError::NotFound(format!("order {}", id)))
}

// --- In-memory implementation ---

#[derive(Default)]
struct Tables {
  orders: HashMap<Uuid, Order>,
  items: HashMap<Uuid, OrderItem>,
}

/// Process-local store. Used by tests and by single-node deployments that do
/// not need durability.
#[derive(Default)]
pub struct InMemoryOrderStore {
  tables: RwLock<Tables>,
}

impl InMemoryOrderStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
  async fn insert(&self, order: &Order, items: &[OrderItem]) -> FlowResult<()> {
    let mut tables = self.tables.write();
    if tables.orders.contains_key(&order.id) {
      return Err(FlowError::Validation(format!("order {} already exists", order.id)));
    }
    tables.orders.insert(order.id, order.clone());
    for item in items {
      tables.items.insert(item.id, item.clone());
    }
    Ok(())
  }

  async fn order(&self, id: Uuid) -> FlowResult<Option<Order>> {
    Ok(self.tables.read().orders.get(&id).cloned())
  }

  async fn items(&self, order_id: Uuid) -> FlowResult<Vec<OrderItem>> {
    let tables = self.tables.read();
    let mut items: Vec<OrderItem> = tables.items.values().filter(|i| i.order_id == order_id).cloned().collect();
    items.sort_by(|a, b| a.product.code.cmp(&b.product.code).then(a.id.cmp(&b.id)));
    Ok(items)
  }

  async fn find(&self, query: &OrderQuery) -> FlowResult<Vec<Order>> {
    let tables = self.tables.read();
    let mut found: Vec<Order> = tables.orders.values().filter(|o| query.matches(o)).cloned().collect();
    found.sort_by_key(|o| o.modified_at);
    if let Some(limit) = query.limit {
      found.truncate(limit);
    }
    Ok(found)
  }

  async fn find_by_partner_order_id(&self, partner_order_id: &str) -> FlowResult<Option<Order>> {
    let tables = self.tables.read();
    Ok(
      tables
        .orders
        .values()
        .find(|o| !o.is_deleted && o.delivery_partner_order_id.as_deref() == Some(partner_order_id))
        .cloned(),
    )
  }

  async fn find_by_secure_partner_order_id(&self, partner_order_id: &str) -> FlowResult<Option<Order>> {
    let tables = self.tables.read();
    Ok(
      tables
        .orders
        .values()
        .find(|o| !o.is_deleted && o.secure_dp_order_id.as_deref() == Some(partner_order_id))
        .cloned(),
    )
  }

  async fn commit(&self, order: &Order, items: &[OrderItem]) -> FlowResult<Order> {
    let mut tables = self.tables.write();
    let stored_version = match tables.orders.get(&order.id) {
      Some(stored) => stored.version,
      None => return Err(FlowError::NotFound(format!("order {}", order.id))),
    };
    if stored_version != order.version {
      return Err(FlowError::Conflict {
        order_id: order.id,
        expected: order.version,
      });
    }
    if let Some(stray) = items.iter().find(|i| i.order_id != order.id) {
      return Err(FlowError::Validation(format!(
        "item {} does not belong to order {}",
        stray.id, order.id
      )));
    }
    let mut committed = order.clone();
    committed.version += 1;
    tables.orders.insert(committed.id, committed.clone());
    for item in items {
      tables.items.insert(item.id, item.clone());
    }
    Ok(committed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{ItemType, ProductSnapshot};
  use chrono::Duration;

  fn order_at(at: DateTime<Utc>) -> Order {
    Order::new("ORD-1", Uuid::new_v4(), Uuid::new_v4(), 1_000, at)
  }

  #[tokio::test]
  async fn commit_bumps_version_and_rejects_stale_writers() {
    let store = InMemoryOrderStore::new();
    let order = order_at(Utc::now());
    store.insert(&order, &[]).await.unwrap();

    let first = store.commit(&order, &[]).await.unwrap();
    assert_eq!(first.version, 1);

    match store.commit(&order, &[]).await {
      Err(FlowError::Conflict { expected, .. }) => assert_eq!(expected, 0),
      other => panic!("expected conflict, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn commit_refuses_items_of_another_order() {
    let store = InMemoryOrderStore::new();
    let order = order_at(Utc::now());
    store.insert(&order, &[]).await.unwrap();
    let product = ProductSnapshot {
      code: "P1".into(),
      name: "Lamp".into(),
      unit_price: 100,
      seller_id: order.seller_id,
    };
    let stray = OrderItem::new(Uuid::new_v4(), product, 1, ItemType::Buy, Utc::now());
    assert!(matches!(store.commit(&order, &[stray]).await, Err(FlowError::Validation(_))));
  }

  #[tokio::test]
  async fn query_windows_and_soft_delete() {
    let store = InMemoryOrderStore::new();
    let now = Utc::now();
    let old = order_at(now - Duration::hours(3));
    let recent = order_at(now - Duration::minutes(10));
    let mut deleted = order_at(now - Duration::minutes(10));
    deleted.is_deleted = true;
    for o in [&old, &recent, &deleted] {
      store.insert(o, &[]).await.unwrap();
    }

    let query = OrderQuery {
      statuses: vec![OrderStatus::TransactionPending],
      modified_before: Some(now - Duration::minutes(5)),
      modified_since: Some(now - Duration::hours(2)),
      ..Default::default()
    };
    let found = store.find(&query).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, recent.id);
  }
}
