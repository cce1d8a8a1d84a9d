// orderflow/src/status.rs

//! The fixed order state set and its transition table.
//!
//! The table is plain data (`TRANSITIONS`) so the rule set can be inspected and
//! tested without going through any service. Provider status strings (payment
//! gateway, delivery partner) are mapped to internal statuses by the pure
//! functions at the bottom of this module.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
  TransactionPending,
  TransactionProcessed,
  TransactionFailed,
  OrderAccepted,
  StoreNotOperational,
  OrderRejected,
  ReadyForPickUp,
  RiderAssigned,
  OutForDelivery,
  Delivered,
  OrderCancelled,
  RefundRequested,
  FullyRefunded,
  RefundFailed,
  PendingRefund,
  SecureReturnScheduled,
  SecureReturnInitiated,
  SecureReturnCompleted,
  SecureReturnFailed,
}

use OrderStatus::*;

/// current status -> allowed next statuses.
pub const TRANSITIONS: &[(OrderStatus, &[OrderStatus])] = &[
  (TransactionPending, &[TransactionProcessed, TransactionFailed]),
  (TransactionProcessed, &[OrderAccepted, StoreNotOperational, OrderRejected]),
  (OrderAccepted, &[ReadyForPickUp]),
  (ReadyForPickUp, &[RiderAssigned, OrderCancelled]),
  (RiderAssigned, &[OutForDelivery, OrderCancelled]),
  (OutForDelivery, &[Delivered, OrderCancelled]),
  (OrderRejected, &[RefundRequested]),
  (RefundRequested, &[FullyRefunded, RefundFailed, PendingRefund]),
  (Delivered, &[SecureReturnScheduled]),
  (SecureReturnScheduled, &[SecureReturnInitiated, SecureReturnFailed]),
  (SecureReturnInitiated, &[SecureReturnCompleted, SecureReturnFailed]),
];

impl OrderStatus {
  pub const ALL: [OrderStatus; 19] = [
    TransactionPending,
    TransactionProcessed,
    TransactionFailed,
    OrderAccepted,
    StoreNotOperational,
    OrderRejected,
    ReadyForPickUp,
    RiderAssigned,
    OutForDelivery,
    Delivered,
    OrderCancelled,
    RefundRequested,
    FullyRefunded,
    RefundFailed,
    PendingRefund,
    SecureReturnScheduled,
    SecureReturnInitiated,
    SecureReturnCompleted,
    SecureReturnFailed,
  ];

  /// Statuses reachable in one step from `self`. Empty for terminal statuses.
  pub fn successors(self) -> &'static [OrderStatus] {
    TRANSITIONS
      .iter()
      .find(|(from, _)| *from == self)
      .map(|(_, next)| *next)
      .unwrap_or(&[])
  }

  pub fn can_transition_to(self, target: OrderStatus) -> bool {
    self.successors().contains(&target)
  }

  pub fn is_terminal(self) -> bool {
    self.successors().is_empty()
  }

  /// The refund lane is tracked on the order only; items never enter it.
  pub fn applies_to_items(self) -> bool {
    !matches!(self, RefundRequested | FullyRefunded | RefundFailed | PendingRefund)
  }

  /// Shortest legal chain of hops from `self` to `target`, excluding `self`.
  ///
  /// Returns `None` when `target` is unreachable (which includes every
  /// regression) and an empty chain when `target == self`. Delivery polling can
  /// observe a partner state several hops ahead of the local one; walking this
  /// chain keeps one history entry per hop instead of bending the table.
  pub fn forward_path(self, target: OrderStatus) -> Option<Vec<OrderStatus>> {
    if self == target {
      return Some(Vec::new());
    }
    let mut previous: Vec<(OrderStatus, OrderStatus)> = Vec::new();
    let mut queue = VecDeque::from([self]);
    while let Some(current) = queue.pop_front() {
      for next in current.successors() {
        if *next == self || previous.iter().any(|(seen, _)| seen == next) {
          continue;
        }
        previous.push((*next, current));
        if *next == target {
          let mut path = vec![target];
          let mut cursor = current;
          while cursor != self {
            path.push(cursor);
            cursor = previous
              .iter()
              .find(|(seen, _)| *seen == cursor)
              .map(|(_, from)| *from)?;
          }
          path.reverse();
          return Some(path);
        }
        queue.push_back(*next);
      }
    }
    None
  }

  pub fn as_str(self) -> &'static str {
    match self {
      TransactionPending => "TRANSACTION_PENDING",
      TransactionProcessed => "TRANSACTION_PROCESSED",
      TransactionFailed => "TRANSACTION_FAILED",
      OrderAccepted => "ORDER_ACCEPTED",
      StoreNotOperational => "STORE_NOT_OPERATIONAL",
      OrderRejected => "ORDER_REJECTED",
      ReadyForPickUp => "READY_FOR_PICK_UP",
      RiderAssigned => "RIDER_ASSIGNED",
      OutForDelivery => "OUT_FOR_DELIVERY",
      Delivered => "DELIVERED",
      OrderCancelled => "ORDER_CANCELLED",
      RefundRequested => "REFUND_REQUESTED",
      FullyRefunded => "FULLY_REFUNDED",
      RefundFailed => "REFUND_FAILED",
      PendingRefund => "PENDING_REFUND",
      SecureReturnScheduled => "SECURE_RETURN_SCHEDULED",
      SecureReturnInitiated => "SECURE_RETURN_INITIATED",
      SecureReturnCompleted => "SECURE_RETURN_COMPLETED",
      SecureReturnFailed => "SECURE_RETURN_FAILED",
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OrderStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    OrderStatus::ALL
      .iter()
      .copied()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| format!("unknown order status '{}'", s))
  }
}

// --- Provider status mapping ---

/// Payment gateway attempt state -> order status. `None` means "still pending,
/// nothing to apply".
pub fn map_payment_state(state: &str) -> Option<OrderStatus> {
  match state {
    "COMPLETED" => Some(TransactionProcessed),
    "FAILED" => Some(TransactionFailed),
    _ => None,
  }
}

/// Gateway refund state -> order status. Anything the gateway has not settled
/// yet parks the order in PENDING_REFUND.
pub fn map_refund_state(state: &str) -> OrderStatus {
  match state {
    "COMPLETED" => FullyRefunded,
    "FAILED" => RefundFailed,
    _ => PendingRefund,
  }
}

/// Delivery partner shipment status for a forward shipment.
pub const PARTNER_STATUS_MAP: &[(&str, OrderStatus)] = &[
  ("open", ReadyForPickUp),
  ("accepted", RiderAssigned),
  ("live", OutForDelivery),
  ("cancelled", OrderCancelled),
  ("ended", Delivered),
];

pub fn map_partner_status(status: &str) -> Option<OrderStatus> {
  PARTNER_STATUS_MAP
    .iter()
    .find(|(name, _)| name.eq_ignore_ascii_case(status))
    .map(|(_, mapped)| *mapped)
}

/// Partner status for a reverse (secure return) shipment. Only the two
/// settling states move the order; the rest are in-flight.
pub fn map_reverse_partner_status(status: &str) -> Option<OrderStatus> {
  if status.eq_ignore_ascii_case("ended") {
    Some(SecureReturnCompleted)
  } else if status.eq_ignore_ascii_case("cancelled") {
    Some(SecureReturnFailed)
  } else {
    None
  }
}
