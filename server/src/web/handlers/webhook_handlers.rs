// orderflow_server/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use orderflow::ports::{ShipmentFare, ShipmentStatus};
use orderflow::FlowError;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

/// Status push from the delivery partner. `order_id` is the partner's
/// shipment id, forward or return.
#[derive(Debug, Deserialize)]
pub struct DeliveryWebhookPayload {
  pub order_id: String,
  pub status: String,
  #[serde(default)]
  pub fare: Option<ShipmentFare>,
}

/// Compares without short-circuiting on the first differing byte.
fn secret_matches(presented: &[u8], expected: &[u8]) -> bool {
  presented.len() == expected.len() && presented.iter().zip(expected).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

/// The body is only parsed once the secret has been checked.
#[instrument(
    name = "handler::delivery_webhook",
    skip(app_state, req, body),
    fields(payload_bytes = body.len())
)]
pub async fn delivery_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let presented = req
    .headers()
    .get(WEBHOOK_SECRET_HEADER)
    .map(|h| h.as_bytes())
    .unwrap_or_default();
  if !secret_matches(presented, app_state.webhook_secret.as_bytes()) {
    warn!("Delivery webhook rejected: bad or missing secret.");
    return Err(AppError::Auth("invalid webhook secret".to_string()));
  }

  let payload: DeliveryWebhookPayload = serde_json::from_slice(&body)
    .map_err(|e| FlowError::Validation(format!("malformed delivery update: {}", e)))?;
  info!(partner_order_id = %payload.order_id, partner_status = %payload.status, "Delivery update received.");
  let update = ShipmentStatus {
    status: payload.status,
    fare: payload.fare,
  };
  let outcome = app_state
    .lifecycle
    .apply_delivery_update(&payload.order_id, &update)
    .await?;
  info!(order_id = %outcome.order_id(), "Delivery update processed.");
  Ok(HttpResponse::Ok().json(outcome))
}
