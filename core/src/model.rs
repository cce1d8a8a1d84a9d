// orderflow/src/model.rs

//! Persisted aggregates (`Order`, `OrderItem`) and the collaborator-side
//! records the lifecycle reads (customers, sellers, addresses).

use crate::settlement::SettlementBreakdown;
use crate::status::OrderStatus;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Monetary amounts are minor units (paise/cents).
pub type Amount = i64;

// --- Actors and requesters ---

/// Who caused a status change. Stored verbatim in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
  pub fn system(component: &str) -> Self {
    Actor(format!("system:{}", component))
  }

  pub fn user(role: Role, user_id: Uuid) -> Self {
    Actor(format!("{}:{}", role.as_str(), user_id))
  }

  pub fn delivery_partner() -> Self {
    Actor("delivery-partner".to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Actor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Customer,
  Seller,
  Admin,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Role::Customer => "customer",
      Role::Seller => "seller",
      Role::Admin => "admin",
    }
  }

  pub fn parse(s: &str) -> Option<Role> {
    match s.to_ascii_lowercase().as_str() {
      "customer" => Some(Role::Customer),
      "seller" => Some(Role::Seller),
      "admin" => Some(Role::Admin),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
  ScheduleSecureReturn,
  AppraiseSecureReturn,
  DecideOrder,
  OperateDispatch,
}

/// An authenticated caller of a user-facing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
  pub user_id: Uuid,
  pub role: Role,
}

impl Requester {
  pub fn customer(user_id: Uuid) -> Self {
    Requester { user_id, role: Role::Customer }
  }

  pub fn seller(user_id: Uuid) -> Self {
    Requester { user_id, role: Role::Seller }
  }

  pub fn admin(user_id: Uuid) -> Self {
    Requester { user_id, role: Role::Admin }
  }

  pub fn can(&self, permission: Permission) -> bool {
    match (self.role, permission) {
      (Role::Customer, Permission::ScheduleSecureReturn) => true,
      (Role::Seller, Permission::AppraiseSecureReturn | Permission::DecideOrder) => true,
      (Role::Admin, Permission::DecideOrder | Permission::OperateDispatch) => true,
      _ => false,
    }
  }

  pub fn actor(&self) -> Actor {
    Actor::user(self.role, self.user_id)
  }
}

// --- Status history ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
  pub status: OrderStatus,
  pub actor: Actor,
  pub at: DateTime<Utc>,
}

fn last_reached_in(history: &[StatusEntry], status: OrderStatus) -> Option<DateTime<Utc>> {
  history.iter().rev().find(|entry| entry.status == status).map(|entry| entry.at)
}

// --- Addresses, fares, slots ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
  pub id: Uuid,
  pub owner_id: Uuid,
  pub contact_name: String,
  pub phone: String,
  pub line1: String,
  pub line2: Option<String>,
  pub landmark: Option<String>,
  pub city: String,
  pub state: String,
  pub pincode: String,
  pub country: String,
  pub lat: f64,
  pub lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FareDetails {
  pub estimate: Option<Amount>,
  pub actual: Option<Amount>,
}

/// A pickup window, written `HH:MM-HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlot {
  pub start: NaiveTime,
  pub end: NaiveTime,
}

impl TimeSlot {
  pub fn parse(raw: &str) -> Result<Self, String> {
    let (start, end) = raw
      .split_once('-')
      .ok_or_else(|| format!("time slot '{}' must look like HH:MM-HH:MM", raw))?;
    let parse = |part: &str| {
      NaiveTime::parse_from_str(part.trim(), "%H:%M").map_err(|e| format!("time slot '{}': {}", raw, e))
    };
    let slot = TimeSlot { start: parse(start)?, end: parse(end)? };
    if slot.start >= slot.end {
      return Err(format!("time slot '{}' ends before it starts", raw));
    }
    Ok(slot)
  }

  pub fn contains(&self, time: NaiveTime) -> bool {
    self.start <= time && time < self.end
  }

  pub fn within(&self, outer: &TimeSlot) -> bool {
    outer.start <= self.start && self.end <= outer.end
  }
}

impl fmt::Display for TimeSlot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
  }
}

impl TryFrom<String> for TimeSlot {
  type Error = String;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    TimeSlot::parse(&value)
  }
}

impl From<TimeSlot> for String {
  fn from(slot: TimeSlot) -> Self {
    slot.to_string()
  }
}

// --- Order items ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
  /// Outright purchase; never returnable through the secure lane.
  Buy,
  /// Returnable ("secured") line.
  Secure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
  pub code: String,
  pub name: String,
  pub unit_price: Amount,
  pub seller_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product: ProductSnapshot,
  pub quantity: i32,
  pub item_type: ItemType,
  pub status: OrderStatus,
  pub status_history: Vec<StatusEntry>,
}

impl OrderItem {
  pub fn new(order_id: Uuid, product: ProductSnapshot, quantity: i32, item_type: ItemType, at: DateTime<Utc>) -> Self {
    OrderItem {
      id: Uuid::new_v4(),
      order_id,
      product,
      quantity,
      item_type,
      status: OrderStatus::TransactionPending,
      status_history: vec![StatusEntry {
        status: OrderStatus::TransactionPending,
        actor: Actor::system("checkout"),
        at,
      }],
    }
  }

  pub fn last_reached(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
    last_reached_in(&self.status_history, status)
  }
}

// --- Orders ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
  pub id: Uuid,
  pub code: String,
  pub status: OrderStatus,
  pub status_history: Vec<StatusEntry>,
  pub user_id: Uuid,
  pub seller_id: Uuid,
  pub total_amount: Amount,

  pub payment_status: Option<String>,
  pub payment_mode: Option<String>,
  pub transaction_id: Option<String>,

  pub delivery_partner_order_id: Option<String>,
  pub fare_details: FareDetails,
  pub pickup_eta: Option<DateTime<Utc>>,
  pub pickup_address: Option<Address>,
  pub delivery_address: Option<Address>,

  pub rejection_remarks: Option<String>,
  pub refund_transaction_id: Option<String>,

  pub secure_order_id: Option<String>,
  pub secure_dp_order_id: Option<String>,
  pub secured_time_slot: Option<TimeSlot>,
  pub secured_date: Option<NaiveDate>,
  pub secure_pickup_address: Option<Address>,
  pub secure_delivery_address: Option<Address>,
  pub secure_return_failure_reason: Option<String>,
  pub appraisal_amount: Option<Amount>,
  pub appraisal_remark: Option<String>,
  pub appraised_at: Option<DateTime<Utc>>,

  pub is_payout_done: bool,
  pub settlement_details: Option<SettlementBreakdown>,

  pub is_deleted: bool,
  pub created_at: DateTime<Utc>,
  pub modified_at: DateTime<Utc>,
  /// Optimistic concurrency token, bumped by every successful commit.
  pub version: i64,
}

impl Order {
  /// A freshly checked-out order. Creation itself belongs to checkout; the
  /// constructor exists so stores, fixtures and importers agree on defaults.
  pub fn new(code: impl Into<String>, user_id: Uuid, seller_id: Uuid, total_amount: Amount, at: DateTime<Utc>) -> Self {
    Order {
      id: Uuid::new_v4(),
      code: code.into(),
      status: OrderStatus::TransactionPending,
      status_history: vec![StatusEntry {
        status: OrderStatus::TransactionPending,
        actor: Actor::system("checkout"),
        at,
      }],
      user_id,
      seller_id,
      total_amount,
      payment_status: None,
      payment_mode: None,
      transaction_id: None,
      delivery_partner_order_id: None,
      fare_details: FareDetails::default(),
      pickup_eta: None,
      pickup_address: None,
      delivery_address: None,
      rejection_remarks: None,
      refund_transaction_id: None,
      secure_order_id: None,
      secure_dp_order_id: None,
      secured_time_slot: None,
      secured_date: None,
      secure_pickup_address: None,
      secure_delivery_address: None,
      secure_return_failure_reason: None,
      appraisal_amount: None,
      appraisal_remark: None,
      appraised_at: None,
      is_payout_done: false,
      settlement_details: None,
      is_deleted: false,
      created_at: at,
      modified_at: at,
      version: 0,
    }
  }

  /// When the order last entered `status`, read from the history.
  pub fn last_reached(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
    last_reached_in(&self.status_history, status)
  }

  pub fn is_paid(&self) -> bool {
    self.payment_status.as_deref() == Some(PAYMENT_COMPLETED)
  }
}

/// Gateway payment state that marks an order as settled on our side.
pub const PAYMENT_COMPLETED: &str = "COMPLETED";

// --- Collaborator records ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
  pub id: Uuid,
  pub name: String,
  pub phone: String,
  pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerContact {
  pub name: String,
  pub phone: String,
  pub email: Option<String>,
  pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seller {
  pub id: Uuid,
  pub store_name: String,
  pub email: String,
  pub contacts: Vec<SellerContact>,
  /// Declared weekly days off; no pickups or returns on these days.
  pub weekly_off_days: Vec<Weekday>,
  /// Registered store address, used as the return drop when none is given.
  pub store_address_id: Option<Uuid>,
}

impl Seller {
  pub fn primary_contact(&self) -> Option<&SellerContact> {
    self.contacts.iter().find(|c| c.is_primary)
  }
}
