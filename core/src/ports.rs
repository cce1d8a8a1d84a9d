// orderflow/src/ports.rs

//! Collaborators the lifecycle consumes but does not implement.
//!
//! Every external system is reached through one of these traits so the engine
//! can run against HTTP/SQL adapters in the server and scripted fakes in tests.
//! Adapters are expected to enforce their own client-side timeouts; a slow
//! provider must surface as an error rather than hang a sweep worker.

use crate::error::FlowResult;
use crate::model::{Address, Amount, Customer, Seller};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Payment gateway ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutResponse {
  pub redirect_url: Option<String>,
  pub gateway_order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
  pub state: String,
  pub mode: Option<String>,
  pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
  pub payment_attempts: Vec<PaymentAttempt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResponse {
  pub state: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn create_order(&self, order_code: &str, amount: Amount) -> FlowResult<CheckoutResponse>;

  /// `Ok(None)` when the gateway answered with an empty body.
  async fn order_status(&self, order_code: &str) -> FlowResult<Option<PaymentStatusResponse>>;

  /// `Ok(None)` when the gateway accepted the call but returned no outcome.
  async fn refund(&self, refund_id: &str, order_code: &str, amount: Amount) -> FlowResult<Option<RefundResponse>>;
}

// --- Delivery partner ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentContact {
  pub name: String,
  /// Already formatted with the country code.
  pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentStop {
  pub contact: ShipmentContact,
  pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRequest {
  pub request_id: String,
  pub pickup: ShipmentStop,
  pub drop: ShipmentStop,
  pub instructions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCreated {
  pub shipment_id: String,
  pub fare_estimate: Option<Amount>,
  pub pickup_eta: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentFare {
  pub estimate: Option<Amount>,
  pub actual: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentStatus {
  /// One of `open`, `accepted`, `live`, `ended`, `cancelled`.
  pub status: String,
  pub fare: Option<ShipmentFare>,
}

#[async_trait]
pub trait DeliveryPartner: Send + Sync {
  async fn create_shipment(&self, request: &ShipmentRequest) -> FlowResult<ShipmentCreated>;
  async fn shipment(&self, shipment_id: &str) -> FlowResult<ShipmentStatus>;
}

// --- Internal collaborators ---

#[async_trait]
pub trait Inventory: Send + Sync {
  /// Implementations floor the stored quantity at zero.
  async fn decrement_quantity(&self, product_code: &str, quantity: i32) -> FlowResult<()>;
  async fn set_available_quantity(&self, product_code: &str, quantity: i32) -> FlowResult<()>;
}

#[async_trait]
pub trait Cart: Send + Sync {
  async fn remove_items(&self, user_id: Uuid, product_codes: &[String]) -> FlowResult<()>;
}

#[async_trait]
pub trait Directory: Send + Sync {
  async fn customer(&self, id: Uuid) -> FlowResult<Option<Customer>>;
  async fn seller(&self, id: Uuid) -> FlowResult<Option<Seller>>;
  async fn address(&self, id: Uuid) -> FlowResult<Option<Address>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
  pub to: String,
  pub subject: String,
  pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
  /// Queues an email. Delivery is best effort and never blocks a transition.
  async fn enqueue(&self, email: Email) -> FlowResult<()>;
}

// --- Time ---

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}
