// orderflow_server/src/db/mod.rs

pub mod catalog;
pub mod orders;

pub use catalog::PgCatalog;
pub use orders::PgOrderStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Opens the pool and brings the schema up to date.
pub async fn connect(database_url: &str, max_connections: u32) -> crate::errors::Result<PgPool> {
  let pool = PgPoolOptions::new()
    .max_connections(max_connections)
    .connect(database_url)
    .await?;
  sqlx::migrate!("./migrations").run(&pool).await?;
  tracing::info!("Database connected and migrations applied.");
  Ok(pool)
}
