// orderflow_server/src/main.rs

mod config;
mod db;
mod errors;
mod services;
mod state;
mod web;

use crate::config::AppConfig;
use crate::db::{PgCatalog, PgOrderStore};
use crate::services::{HttpDeliveryPartner, HttpPaymentGateway, LogNotifier};
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use anyhow::Context;
use orderflow::ports::SystemClock;
use orderflow::{Collaborators, OrderLifecycle};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

fn build_lifecycle(app_config: &AppConfig, pool: sqlx::PgPool) -> anyhow::Result<OrderLifecycle> {
  let catalog = Arc::new(PgCatalog::new(pool.clone()));
  let gateway = HttpPaymentGateway::new(
    &app_config.payment_gateway_url,
    &app_config.payment_gateway_key,
    app_config.provider_timeout,
  )
  .context("building payment gateway client")?;
  let partner = HttpDeliveryPartner::new(
    &app_config.delivery_partner_url,
    &app_config.delivery_partner_key,
    app_config.provider_timeout,
  )
  .context("building delivery partner client")?;

  let ports = Collaborators {
    store: Arc::new(PgOrderStore::new(pool)),
    gateway: Arc::new(gateway),
    partner: Arc::new(partner),
    inventory: catalog.clone(),
    cart: catalog.clone(),
    directory: catalog,
    notifier: Arc::new(LogNotifier::new(app_config.email_sender.clone())),
    clock: Arc::new(SystemClock),
  };
  Ok(OrderLifecycle::new(ports, app_config.lifecycle.clone()))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // RUST_LOG override
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting orderflow server...");

  let app_config = AppConfig::from_env().context("loading configuration")?;
  let pool = db::connect(&app_config.database_url, app_config.db_max_connections)
    .await
    .context("connecting to the database")?;

  let lifecycle = Arc::new(build_lifecycle(&app_config, pool)?);
  let sweeps = if app_config.sweeps_enabled {
    let (handle, shutdown) = lifecycle.sweeper().spawn();
    tracing::info!("Background sweeps started.");
    Some((handle, shutdown))
  } else {
    tracing::info!("Background sweeps disabled for this process.");
    None
  };

  let app_state = AppState {
    lifecycle,
    webhook_secret: Arc::from(app_config.webhook_secret.as_str()),
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  let served = HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)
  .with_context(|| format!("binding {}", server_address))?
  .run()
  .await;

  if let Some((handle, shutdown)) = sweeps {
    let _ = shutdown.send(true);
    if let Err(e) = handle.await {
      tracing::error!(error = %e, "Sweeper task ended abnormally.");
    }
  }
  tracing::info!("Server stopped.");
  served.context("running HTTP server")
}
