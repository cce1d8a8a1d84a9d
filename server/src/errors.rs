// orderflow_server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use orderflow::FlowError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration Error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error(transparent)]
  Flow(#[from] FlowError),
}

impl AppError {
  /// Stable machine-readable code for the response body.
  fn code(&self) -> &'static str {
    match self {
      AppError::Auth(_) => "UNAUTHORIZED",
      AppError::Flow(flow) => match flow {
        FlowError::Validation(_) => "VALIDATION_ERROR",
        FlowError::MultiSellerOrder { .. } => "MULTI_SELLER_ORDER",
        FlowError::MissingPrimaryContact { .. } => "MISSING_PRIMARY_CONTACT",
        FlowError::NotFound(_) => "NOT_FOUND",
        FlowError::Forbidden(_) => "FORBIDDEN",
        FlowError::InvalidTransition { .. } => "INVALID_TRANSITION",
        FlowError::Conflict { .. } => "CONFLICT",
        FlowError::GatewayUnavailable(_) => "PAYMENT_GATEWAY_UNAVAILABLE",
        FlowError::DeliveryPartner(_) => "DELIVERY_PARTNER_ERROR",
        FlowError::ExternalProvider { .. } => "PROVIDER_ERROR",
        FlowError::Store { .. } | FlowError::Workflow(_) => "INTERNAL_ERROR",
      },
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Migrate(_) => "INTERNAL_ERROR",
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Flow(flow) => match flow {
        FlowError::Validation(_) | FlowError::MultiSellerOrder { .. } | FlowError::MissingPrimaryContact { .. } => {
          StatusCode::BAD_REQUEST
        }
        FlowError::NotFound(_) => StatusCode::NOT_FOUND,
        FlowError::Forbidden(_) => StatusCode::FORBIDDEN,
        FlowError::InvalidTransition { .. } | FlowError::Conflict { .. } => StatusCode::CONFLICT,
        e if e.is_external() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
      },
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Migrate(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    // Internal details stay in the log.
    let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
      tracing::error!(application_error = %self, "Responding with error");
      "An internal error occurred".to_string()
    } else {
      tracing::warn!(application_error = %self, status = status.as_u16(), "Responding with error");
      self.to_string()
    };
    HttpResponse::build(status).json(json!({ "code": self.code(), "error": message }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;
  use orderflow::OrderStatus;
  use uuid::Uuid;

  #[test]
  fn flow_errors_map_to_http_statuses() {
    let cases: Vec<(AppError, StatusCode)> = vec![
      (FlowError::Validation("x".into()).into(), StatusCode::BAD_REQUEST),
      (FlowError::MultiSellerOrder { order_id: Uuid::nil() }.into(), StatusCode::BAD_REQUEST),
      (AppError::Auth("x".into()), StatusCode::UNAUTHORIZED),
      (FlowError::Forbidden("x".into()).into(), StatusCode::FORBIDDEN),
      (FlowError::NotFound("x".into()).into(), StatusCode::NOT_FOUND),
      (
        FlowError::InvalidTransition {
          from: OrderStatus::Delivered,
          to: OrderStatus::OrderAccepted,
        }
        .into(),
        StatusCode::CONFLICT,
      ),
      (FlowError::GatewayUnavailable("down".into()).into(), StatusCode::BAD_GATEWAY),
      (FlowError::store(anyhow::anyhow!("disk")).into(), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, expected) in cases {
      assert_eq!(err.status_code(), expected, "{}", err);
    }
  }

  #[test]
  fn internal_errors_hide_their_detail() {
    let err: AppError = FlowError::store(anyhow::anyhow!("connection refused on 10.0.0.7")).into();
    assert_eq!(err.code(), "INTERNAL_ERROR");
    let resp = err.error_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
  }
}
