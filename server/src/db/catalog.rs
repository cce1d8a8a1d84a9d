// orderflow_server/src/db/catalog.rs

//! Product stock, carts and the customer/seller/address directory, read and
//! adjusted by the lifecycle after payment and on rejection.

use async_trait::async_trait;
use orderflow::error::{FlowError, FlowResult};
use orderflow::model::{Address, Customer, Seller};
use orderflow::ports::{Cart, Directory, Inventory};
use serde::de::DeserializeOwned;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgCatalog {
  pool: PgPool,
}

impl PgCatalog {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  async fn document<T>(&self, table: &str, id: Uuid) -> FlowResult<Option<T>>
  where
    T: DeserializeOwned + Send + Unpin + 'static,
  {
    let sql = format!("SELECT body FROM {} WHERE id = $1", table);
    let row = sqlx::query_scalar::<_, Json<T>>(&sql)
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .map_err(FlowError::store)?;
    Ok(row.map(|Json(doc)| doc))
  }
}

#[async_trait]
impl Inventory for PgCatalog {
  async fn decrement_quantity(&self, product_code: &str, quantity: i32) -> FlowResult<()> {
    let result = sqlx::query(
      "UPDATE products SET available_quantity = GREATEST(available_quantity - $2, 0) WHERE code = $1",
    )
    .bind(product_code)
    .bind(quantity)
    .execute(&self.pool)
    .await
    .map_err(FlowError::store)?;
    if result.rows_affected() == 0 {
      warn!(product_code, "Stock decrement for unknown product.");
    }
    Ok(())
  }

  async fn set_available_quantity(&self, product_code: &str, quantity: i32) -> FlowResult<()> {
    sqlx::query("UPDATE products SET available_quantity = GREATEST($2, 0) WHERE code = $1")
      .bind(product_code)
      .bind(quantity)
      .execute(&self.pool)
      .await
      .map_err(FlowError::store)?;
    Ok(())
  }
}

#[async_trait]
impl Cart for PgCatalog {
  async fn remove_items(&self, user_id: Uuid, product_codes: &[String]) -> FlowResult<()> {
    if product_codes.is_empty() {
      return Ok(());
    }
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_code = ANY($2)")
      .bind(user_id)
      .bind(product_codes)
      .execute(&self.pool)
      .await
      .map_err(FlowError::store)?;
    Ok(())
  }
}

#[async_trait]
impl Directory for PgCatalog {
  async fn customer(&self, id: Uuid) -> FlowResult<Option<Customer>> {
    self.document("customers", id).await
  }

  async fn seller(&self, id: Uuid) -> FlowResult<Option<Seller>> {
    self.document("sellers", id).await
  }

  async fn address(&self, id: Uuid) -> FlowResult<Option<Address>> {
    self.document("addresses", id).await
  }
}
