// orderflow/src/settlement.rs

//! Seller payout arithmetic. Pure functions over minor units.

use crate::model::Amount;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBreakdown {
  pub order_amount: Amount,
  pub platform_fee: Amount,
  pub tax_on_fee: Amount,
  pub delivery_charge: Amount,
  pub payout: Amount,
}

/// Basis-point share of `amount`, rounded half up.
pub fn percentage_of(amount: Amount, bps: u32) -> Amount {
  let scaled = amount as i128 * bps as i128;
  let rounded = if scaled >= 0 { (scaled + 5_000) / 10_000 } else { (scaled - 5_000) / 10_000 };
  rounded as Amount
}

/// Splits an order amount into platform fee, tax on that fee, the delivery
/// charge borne by the seller and the remaining payout. The payout never goes
/// negative; a shortfall is the platform's to absorb.
pub fn settle(order_amount: Amount, fee_bps: u32, tax_bps: u32, delivery_charge: Amount) -> SettlementBreakdown {
  let platform_fee = percentage_of(order_amount, fee_bps);
  let tax_on_fee = percentage_of(platform_fee, tax_bps);
  let payout = (order_amount - platform_fee - tax_on_fee - delivery_charge).max(0);
  SettlementBreakdown {
    order_amount,
    platform_fee,
    tax_on_fee,
    delivery_charge,
    payout,
  }
}
