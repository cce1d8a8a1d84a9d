// orderflow/src/error.rs

use crate::status::OrderStatus;
use anyhow::Error as AnyhowError;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the step runner itself, as opposed to the steps it runs.
#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("Step not found in workflow '{workflow}': {step_name}")]
  StepNotFound { workflow: String, step_name: String },

  #[error("Handler missing for non-optional step '{step_name}' in workflow '{workflow}'")]
  HandlerMissing { workflow: String, step_name: String },

  #[error("Workflow '{workflow}' ended without producing {missing}")]
  IncompleteOutcome { workflow: String, missing: String },
}

#[derive(Debug, Error)]
pub enum FlowError {
  /// Missing or malformed request fields. Surfaced, never retried.
  #[error("Validation error: {0}")]
  Validation(String),

  #[error("Not found: {0}")]
  NotFound(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Invalid transition {from} -> {to}")]
  InvalidTransition { from: OrderStatus, to: OrderStatus },

  /// The stored order moved on between read and write.
  #[error("Order {order_id} was modified concurrently (expected version {expected})")]
  Conflict { order_id: Uuid, expected: i64 },

  #[error("Order {order_id} has items from more than one seller")]
  MultiSellerOrder { order_id: Uuid },

  #[error("Seller {seller_id} has no primary point of contact")]
  MissingPrimaryContact { seller_id: Uuid },

  #[error("Payment gateway unavailable: {0}")]
  GatewayUnavailable(String),

  #[error("Delivery partner error: {0}")]
  DeliveryPartner(String),

  #[error("External provider error: {source}")]
  ExternalProvider {
    #[source]
    source: AnyhowError,
  },

  #[error("Order store error: {source}")]
  Store {
    #[source]
    source: AnyhowError,
  },

  #[error("Workflow error: {0}")]
  Workflow(#[from] WorkflowError),
}

impl FlowError {
  pub fn store(err: impl Into<AnyhowError>) -> Self {
    FlowError::Store { source: err.into() }
  }

  pub fn external(err: impl Into<AnyhowError>) -> Self {
    FlowError::ExternalProvider { source: err.into() }
  }

  /// Provider-side trouble: background jobs log it and leave the order for the
  /// next scheduled pass.
  pub fn is_external(&self) -> bool {
    matches!(
      self,
      FlowError::GatewayUnavailable(_) | FlowError::DeliveryPartner(_) | FlowError::ExternalProvider { .. }
    )
  }

  /// Errors that belong to the caller's request rather than to the system.
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      FlowError::Validation(_)
        | FlowError::NotFound(_)
        | FlowError::Forbidden(_)
        | FlowError::InvalidTransition { .. }
        | FlowError::Conflict { .. }
        | FlowError::MultiSellerOrder { .. }
        | FlowError::MissingPrimaryContact { .. }
    )
  }
}

pub type FlowResult<T, E = FlowError> = std::result::Result<T, E>;
