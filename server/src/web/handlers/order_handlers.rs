// orderflow_server/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use orderflow::model::{Requester, Role};
use orderflow::store::require_order;
use orderflow::{FlowError, Order};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

/// Customers see their own orders, sellers the orders placed with them.
fn ensure_visible(requester: &Requester, order: &Order) -> Result<(), AppError> {
  let visible = match requester.role {
    Role::Admin => true,
    Role::Customer => order.user_id == requester.user_id,
    Role::Seller => order.seller_id == requester.user_id,
  };
  if visible {
    Ok(())
  } else {
    Err(FlowError::Forbidden(format!("order {} is not visible to this user", order.id)).into())
  }
}

async fn load_visible(app_state: &AppState, requester: &Requester, order_id: Uuid) -> Result<Order, AppError> {
  let order = require_order(app_state.lifecycle.context().store(), order_id).await?;
  ensure_visible(requester, &order)?;
  Ok(order)
}

#[instrument(name = "handler::order_status", skip(app_state, auth_user), fields(order_id = %order_id))]
pub async fn order_status_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order_id = order_id.into_inner();
  load_visible(&app_state, &auth_user.0, order_id).await?;
  let order = app_state.lifecycle.order_status(order_id).await?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::accept_order", skip(app_state, auth_user), fields(order_id = %order_id))]
pub async fn accept_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state.lifecycle.accept_order(&auth_user.0, order_id.into_inner()).await?;
  info!(status = %order.status, "Order accepted.");
  Ok(HttpResponse::Ok().json(order))
}

#[derive(Debug, Deserialize)]
pub struct RejectOrderPayload {
  #[serde(default)]
  pub remarks: String,
}

#[instrument(name = "handler::reject_order", skip(app_state, auth_user, payload), fields(order_id = %order_id))]
pub async fn reject_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  payload: web::Json<RejectOrderPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let outcome = app_state
    .lifecycle
    .reject_order(&auth_user.0, order_id.into_inner(), &payload.remarks)
    .await?;
  info!(refund_id = %outcome.refund_id, status = %outcome.status, "Order rejected.");
  Ok(HttpResponse::Ok().json(outcome))
}

#[instrument(name = "handler::store_not_operational", skip(app_state, auth_user), fields(order_id = %order_id))]
pub async fn store_not_operational_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .lifecycle
    .mark_store_not_operational(&auth_user.0, order_id.into_inner())
    .await?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::dispatch_order", skip(app_state, auth_user), fields(order_id = %order_id))]
pub async fn dispatch_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state.lifecycle.dispatch_order(&auth_user.0, order_id.into_inner()).await?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::settlement", skip(app_state, auth_user), fields(order_id = %order_id))]
pub async fn settlement_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order_id = order_id.into_inner();
  if auth_user.0.role == Role::Customer {
    return Err(FlowError::Forbidden("settlements are visible to sellers and admins".to_string()).into());
  }
  load_visible(&app_state, &auth_user.0, order_id).await?;
  let view = app_state.lifecycle.settlement(order_id).await?;
  Ok(HttpResponse::Ok().json(view))
}
