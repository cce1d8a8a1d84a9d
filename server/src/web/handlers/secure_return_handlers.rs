// orderflow_server/src/web/handlers/secure_return_handlers.rs

use actix_web::{web, HttpResponse};
use orderflow::{AppraisalRequest, SecureReturnRequest};
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[instrument(
    name = "handler::initiate_secure_return",
    skip(app_state, payload, auth_user),
    fields(order_id = ?payload.order_id, user_id = %auth_user.0.user_id)
)]
pub async fn initiate_secure_return_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<SecureReturnRequest>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .lifecycle
    .initiate_secure_return(&auth_user.0, payload.into_inner())
    .await?;
  info!(
    secure_order_id = ?order.secure_order_id,
    date = ?order.secured_date,
    "Secure return scheduled."
  );
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(
    name = "handler::appraise_secure_return",
    skip(app_state, payload, auth_user),
    fields(order_id = ?payload.order_id)
)]
pub async fn appraise_secure_return_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<AppraisalRequest>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .lifecycle
    .appraise_secure_return(&auth_user.0, payload.into_inner())
    .await?;
  Ok(HttpResponse::Ok().json(order))
}
