// orderflow_server/src/db/orders.rs

//! Postgres-backed `OrderStore`. Each order is one JSONB document plus the
//! columns the sweeps filter on; `commit` guards on `version` inside a
//! transaction so an order and its items land together or not at all.

use async_trait::async_trait;
use orderflow::error::{FlowError, FlowResult};
use orderflow::{Order, OrderItem, OrderQuery, OrderStore};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "SELECT body, version FROM orders";

#[derive(Clone)]
pub struct PgOrderStore {
  pool: PgPool,
}

impl PgOrderStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  async fn fetch_one_by(&self, column: &str, value: &str) -> FlowResult<Option<Order>> {
    let sql = format!("{} WHERE {} = $1 AND NOT is_deleted", ORDER_COLUMNS, column);
    let row = sqlx::query_as::<_, (Json<Order>, i64)>(&sql)
      .bind(value)
      .fetch_optional(&self.pool)
      .await
      .map_err(FlowError::store)?;
    Ok(row.map(hydrate))
  }

  async fn upsert_items(tx: &mut Transaction<'_, Postgres>, items: &[OrderItem]) -> FlowResult<()> {
    for item in items {
      sqlx::query(
        "INSERT INTO order_items (id, order_id, product_code, body) VALUES ($1, $2, $3, $4)
         ON CONFLICT (id) DO UPDATE SET body = EXCLUDED.body",
      )
      .bind(item.id)
      .bind(item.order_id)
      .bind(&item.product.code)
      .bind(Json(item))
      .execute(&mut **tx)
      .await
      .map_err(FlowError::store)?;
    }
    Ok(())
  }
}

/// The `version` column is authoritative over the copy inside the document.
fn hydrate((Json(mut order), version): (Json<Order>, i64)) -> Order {
  order.version = version;
  order
}

#[async_trait]
impl OrderStore for PgOrderStore {
  #[instrument(name = "PgOrderStore::insert", skip_all, fields(order_id = %order.id), err(Display))]
  async fn insert(&self, order: &Order, items: &[OrderItem]) -> FlowResult<()> {
    let mut tx = self.pool.begin().await.map_err(FlowError::store)?;
    sqlx::query(
      "INSERT INTO orders (id, code, status, user_id, seller_id, delivery_partner_order_id, secure_dp_order_id,
                           is_deleted, modified_at, version, body)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(order.id)
    .bind(&order.code)
    .bind(order.status.as_str())
    .bind(order.user_id)
    .bind(order.seller_id)
    .bind(&order.delivery_partner_order_id)
    .bind(&order.secure_dp_order_id)
    .bind(order.is_deleted)
    .bind(order.modified_at)
    .bind(order.version)
    .bind(Json(order))
    .execute(&mut *tx)
    .await
    .map_err(FlowError::store)?;
    Self::upsert_items(&mut tx, items).await?;
    tx.commit().await.map_err(FlowError::store)
  }

  async fn order(&self, id: Uuid) -> FlowResult<Option<Order>> {
    let sql = format!("{} WHERE id = $1", ORDER_COLUMNS);
    let row = sqlx::query_as::<_, (Json<Order>, i64)>(&sql)
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .map_err(FlowError::store)?;
    Ok(row.map(hydrate))
  }

  async fn items(&self, order_id: Uuid) -> FlowResult<Vec<OrderItem>> {
    let rows = sqlx::query_scalar::<_, Json<OrderItem>>(
      "SELECT body FROM order_items WHERE order_id = $1 ORDER BY product_code, id",
    )
    .bind(order_id)
    .fetch_all(&self.pool)
    .await
    .map_err(FlowError::store)?;
    Ok(rows.into_iter().map(|Json(item)| item).collect())
  }

  async fn find(&self, query: &OrderQuery) -> FlowResult<Vec<Order>> {
    let statuses: Vec<String> = query.statuses.iter().map(|s| s.as_str().to_string()).collect();
    let limit = query.limit.map(|l| l as i64);
    let sql = format!(
      "{} WHERE NOT is_deleted
         AND (cardinality($1::text[]) = 0 OR status = ANY($1))
         AND ($2::timestamptz IS NULL OR modified_at < $2)
         AND ($3::timestamptz IS NULL OR modified_at >= $3)
         AND (NOT $4 OR delivery_partner_order_id IS NOT NULL)
         AND (NOT $5 OR secure_dp_order_id IS NOT NULL)
         AND ($7::timestamp IS NULL
              OR (body->>'secured_date')::date < $7::date
              OR ((body->>'secured_date')::date = $7::date
                  AND left(body->>'secured_time_slot', 5)::time <= $7::time))
       ORDER BY modified_at
       LIMIT $6",
      ORDER_COLUMNS
    );
    let rows = sqlx::query_as::<_, (Json<Order>, i64)>(&sql)
      .bind(&statuses)
      .bind(query.modified_before)
      .bind(query.modified_since)
      .bind(query.with_partner_order)
      .bind(query.with_secure_partner_order)
      .bind(limit)
      .bind(query.return_due_by)
      .fetch_all(&self.pool)
      .await
      .map_err(FlowError::store)?;
    debug!(matched = rows.len(), "Order query executed.");
    Ok(rows.into_iter().map(hydrate).collect())
  }

  async fn find_by_partner_order_id(&self, partner_order_id: &str) -> FlowResult<Option<Order>> {
    self.fetch_one_by("delivery_partner_order_id", partner_order_id).await
  }

  async fn find_by_secure_partner_order_id(&self, partner_order_id: &str) -> FlowResult<Option<Order>> {
    self.fetch_one_by("secure_dp_order_id", partner_order_id).await
  }

  #[instrument(
    name = "PgOrderStore::commit",
    skip_all,
    fields(order_id = %order.id, expected_version = order.version, items = items.len()),
    err(Display)
  )]
  async fn commit(&self, order: &Order, items: &[OrderItem]) -> FlowResult<Order> {
    if let Some(stray) = items.iter().find(|i| i.order_id != order.id) {
      return Err(FlowError::Validation(format!(
        "item {} does not belong to order {}",
        stray.id, order.id
      )));
    }

    let mut committed = order.clone();
    committed.version += 1;

    let mut tx = self.pool.begin().await.map_err(FlowError::store)?;
    let updated = sqlx::query(
      "UPDATE orders
          SET status = $3, delivery_partner_order_id = $4, secure_dp_order_id = $5,
              is_deleted = $6, modified_at = $7, version = $8, body = $9
        WHERE id = $1 AND version = $2",
    )
    .bind(order.id)
    .bind(order.version)
    .bind(committed.status.as_str())
    .bind(&committed.delivery_partner_order_id)
    .bind(&committed.secure_dp_order_id)
    .bind(committed.is_deleted)
    .bind(committed.modified_at)
    .bind(committed.version)
    .bind(Json(&committed))
    .execute(&mut *tx)
    .await
    .map_err(FlowError::store)?;

    if updated.rows_affected() == 0 {
      tx.rollback().await.map_err(FlowError::store)?;
      let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
        .bind(order.id)
        .fetch_one(&self.pool)
        .await
        .map_err(FlowError::store)?;
      return Err(if exists {
        FlowError::Conflict {
          order_id: order.id,
          expected: order.version,
        }
      } else {
        FlowError::NotFound(format!("order {}", order.id))
      });
    }

    Self::upsert_items(&mut tx, items).await?;
    tx.commit().await.map_err(FlowError::store)?;
    Ok(committed)
  }
}
