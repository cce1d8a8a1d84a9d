// orderflow/src/delivery.rs

//! Delivery reconciliation: folds partner shipment states into the local
//! order, from polling sweeps and from the partner's webhook.
//!
//! Every entry point re-reads the partner state and compares it with the
//! local status before touching anything, so replays of the same update
//! converge without adding history.

use crate::error::{FlowError, FlowResult};
use crate::lifecycle::LifecycleContext;
use crate::model::{Actor, Order};
use crate::ports::{ShipmentFare, ShipmentStatus};
use crate::scheduler::SweepJob;
use crate::settlement::settle;
use crate::status::{map_partner_status, map_reverse_partner_status, OrderStatus};
use crate::store::OrderQuery;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const FORWARD_IN_FLIGHT: [OrderStatus; 3] = [
  OrderStatus::ReadyForPickUp,
  OrderStatus::RiderAssigned,
  OrderStatus::OutForDelivery,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeliveryUpdate {
  Applied { order_id: Uuid, status: OrderStatus, hops: usize },
  Unchanged { order_id: Uuid, status: OrderStatus },
}

impl DeliveryUpdate {
  pub fn order_id(&self) -> Uuid {
    match self {
      DeliveryUpdate::Applied { order_id, .. } | DeliveryUpdate::Unchanged { order_id, .. } => *order_id,
    }
  }
}

fn merge_fare(order: &mut Order, fare: Option<&ShipmentFare>) -> bool {
  let Some(fare) = fare else { return false };
  let before = order.fare_details.clone();
  if fare.estimate.is_some() {
    order.fare_details.estimate = fare.estimate;
  }
  if fare.actual.is_some() {
    order.fare_details.actual = fare.actual;
  }
  order.fare_details != before
}

fn partner_error(e: FlowError) -> FlowError {
  if e.is_external() {
    e
  } else {
    FlowError::DeliveryPartner(e.to_string())
  }
}

pub struct DeliveryReconciler {
  ctx: Arc<LifecycleContext>,
}

impl DeliveryReconciler {
  pub fn new(ctx: Arc<LifecycleContext>) -> Self {
    DeliveryReconciler { ctx }
  }

  async fn poll(&self, shipment_id: &str) -> FlowResult<ShipmentStatus> {
    self.ctx.ports.partner.shipment(shipment_id).await.map_err(partner_error)
  }

  /// Applies a forward-shipment state. Partner states behind the local one
  /// are stale deliveries and leave the order untouched.
  #[instrument(
    name = "DeliveryReconciler::apply_forward",
    skip_all,
    fields(order_id = %order.id, current = %order.status, partner_status = %update.status),
    err(Display)
  )]
  pub async fn apply_forward(&self, mut order: Order, update: &ShipmentStatus) -> FlowResult<DeliveryUpdate> {
    let mapped = map_partner_status(&update.status)
      .ok_or_else(|| FlowError::Validation(format!("unknown delivery status '{}'", update.status)))?;
    if mapped == order.status {
      debug!("Partner state matches, nothing to apply.");
      return Ok(DeliveryUpdate::Unchanged { order_id: order.id, status: order.status });
    }
    if order.status.forward_path(mapped).is_none() {
      warn!(mapped = %mapped, "Partner state does not move the order forward; ignored.");
      return Ok(DeliveryUpdate::Unchanged { order_id: order.id, status: order.status });
    }

    merge_fare(&mut order, update.fare.as_ref());
    if mapped == OrderStatus::Delivered {
      let config = &self.ctx.config;
      let delivery_charge = order.fare_details.actual.or(order.fare_details.estimate).unwrap_or(0);
      order.settlement_details = Some(settle(
        order.total_amount,
        config.platform_fee_bps,
        config.tax_on_fee_bps,
        delivery_charge,
      ));
    }

    let mut items = self.ctx.store().items(order.id).await?;
    let hops = self
      .ctx
      .authority
      .advance(&mut order, &mut items, mapped, &Actor::delivery_partner())
      .await?;
    info!(status = %order.status, hops, "Delivery status applied.");
    Ok(DeliveryUpdate::Applied { order_id: order.id, status: order.status, hops })
  }

  /// Applies a reverse-shipment state to the order and to the items that are
  /// in the return.
  #[instrument(
    name = "DeliveryReconciler::apply_reverse",
    skip_all,
    fields(order_id = %order.id, current = %order.status, partner_status = %update.status),
    err(Display)
  )]
  pub async fn apply_reverse(&self, mut order: Order, update: &ShipmentStatus) -> FlowResult<DeliveryUpdate> {
    if map_partner_status(&update.status).is_none() {
      return Err(FlowError::Validation(format!("unknown delivery status '{}'", update.status)));
    }
    let Some(mapped) = map_reverse_partner_status(&update.status) else {
      debug!("Return pickup still in flight.");
      return Ok(DeliveryUpdate::Unchanged { order_id: order.id, status: order.status });
    };
    if mapped == order.status || order.status != OrderStatus::SecureReturnInitiated {
      debug!(mapped = %mapped, "Return already settled, nothing to apply.");
      return Ok(DeliveryUpdate::Unchanged { order_id: order.id, status: order.status });
    }

    if mapped == OrderStatus::SecureReturnFailed {
      order.secure_return_failure_reason = Some("Return pickup cancelled by the delivery partner".to_string());
    }
    let mut returning: Vec<_> = self
      .ctx
      .store()
      .items(order.id)
      .await?
      .into_iter()
      .filter(|i| i.status == OrderStatus::SecureReturnInitiated)
      .collect();
    self
      .ctx
      .authority
      .transition(&mut order, &mut returning, mapped, &Actor::delivery_partner())
      .await?;
    info!(status = %order.status, items = returning.len(), "Return status applied.");
    Ok(DeliveryUpdate::Applied { order_id: order.id, status: order.status, hops: 1 })
  }

  /// Sweep (a): poll the partner for an in-flight forward shipment.
  pub async fn reconcile_forward(&self, order: Order) -> FlowResult<DeliveryUpdate> {
    let shipment_id = order
      .delivery_partner_order_id
      .clone()
      .ok_or_else(|| FlowError::Validation(format!("order {} has no shipment", order.code)))?;
    let update = self.poll(&shipment_id).await?;
    match map_partner_status(&update.status) {
      Some(_) => self.apply_forward(order, &update).await,
      None => {
        warn!(order_id = %order.id, partner_status = %update.status, "Unrecognised partner status.");
        Ok(DeliveryUpdate::Unchanged { order_id: order.id, status: order.status })
      }
    }
  }

  /// Sweep (b): cancellation charges settle after the cancel itself. Only the
  /// fare moves; a cancelled order never leaves ORDER_CANCELLED.
  pub async fn refresh_cancelled_fare(&self, mut order: Order) -> FlowResult<bool> {
    let Some(shipment_id) = order.delivery_partner_order_id.clone() else {
      return Ok(false);
    };
    let update = self.poll(&shipment_id).await?;
    if let Some(mapped) = map_partner_status(&update.status) {
      if mapped != order.status {
        warn!(order_id = %order.id, partner_status = %update.status, "Partner reports a cancelled order as active.");
        crate::authority::TransitionAuthority::check(order.status, mapped)?;
      }
    }
    if !merge_fare(&mut order, update.fare.as_ref()) {
      return Ok(false);
    }
    self.ctx.authority.persist(&mut order, &[]).await?;
    info!(order_id = %order.id, fare = ?order.fare_details, "Cancelled order fare refreshed.");
    Ok(true)
  }

  /// Sweep (c): poll the partner for an in-flight return pickup.
  pub async fn reconcile_reverse(&self, order: Order) -> FlowResult<DeliveryUpdate> {
    let shipment_id = order
      .secure_dp_order_id
      .clone()
      .ok_or_else(|| FlowError::Validation(format!("order {} has no return shipment", order.code)))?;
    let update = self.poll(&shipment_id).await?;
    if map_partner_status(&update.status).is_none() {
      warn!(order_id = %order.id, partner_status = %update.status, "Unrecognised partner status.");
      return Ok(DeliveryUpdate::Unchanged { order_id: order.id, status: order.status });
    }
    self.apply_reverse(order, &update).await
  }

  /// Webhook ingestion. The shipment id is matched against forward shipments
  /// first, then against return pickups.
  #[instrument(name = "DeliveryReconciler::apply_webhook", skip(self, update), fields(partner_status = %update.status), err(Display))]
  pub async fn apply_webhook(&self, partner_order_id: &str, update: &ShipmentStatus) -> FlowResult<DeliveryUpdate> {
    if map_partner_status(&update.status).is_none() {
      return Err(FlowError::Validation(format!("unknown delivery status '{}'", update.status)));
    }
    let store = self.ctx.store();
    if let Some(order) = store.find_by_partner_order_id(partner_order_id).await? {
      return self.apply_forward(order, update).await;
    }
    if let Some(order) = store.find_by_secure_partner_order_id(partner_order_id).await? {
      return self.apply_reverse(order, update).await;
    }
    Err(FlowError::NotFound(format!("shipment {}", partner_order_id)))
  }
}

pub struct ForwardDeliverySweep {
  ctx: Arc<LifecycleContext>,
  reconciler: DeliveryReconciler,
}

impl ForwardDeliverySweep {
  pub fn new(ctx: Arc<LifecycleContext>) -> Self {
    ForwardDeliverySweep {
      reconciler: DeliveryReconciler::new(ctx.clone()),
      ctx,
    }
  }
}

#[async_trait]
impl SweepJob for ForwardDeliverySweep {
  fn name(&self) -> &'static str {
    "delivery-forward"
  }

  async fn select(&self, now: DateTime<Utc>) -> FlowResult<Vec<Order>> {
    let query = OrderQuery {
      modified_before: Some(now - self.ctx.config.quiet_period),
      with_partner_order: true,
      limit: self.ctx.config.sweep_batch_limit,
      ..OrderQuery::in_statuses(&FORWARD_IN_FLIGHT)
    };
    self.ctx.store().find(&query).await
  }

  async fn process(&self, order: Order) -> FlowResult<()> {
    self.reconciler.reconcile_forward(order).await.map(|_| ())
  }
}

pub struct CancelledFareSweep {
  ctx: Arc<LifecycleContext>,
  reconciler: DeliveryReconciler,
}

impl CancelledFareSweep {
  pub fn new(ctx: Arc<LifecycleContext>) -> Self {
    CancelledFareSweep {
      reconciler: DeliveryReconciler::new(ctx.clone()),
      ctx,
    }
  }
}

#[async_trait]
impl SweepJob for CancelledFareSweep {
  fn name(&self) -> &'static str {
    "delivery-cancelled-fare"
  }

  async fn select(&self, now: DateTime<Utc>) -> FlowResult<Vec<Order>> {
    let config = &self.ctx.config;
    let query = OrderQuery {
      modified_before: Some(now - config.quiet_period),
      modified_since: Some(now - config.cancelled_window),
      with_partner_order: true,
      limit: config.sweep_batch_limit,
      ..OrderQuery::in_statuses(&[OrderStatus::OrderCancelled])
    };
    self.ctx.store().find(&query).await
  }

  async fn process(&self, order: Order) -> FlowResult<()> {
    self.reconciler.refresh_cancelled_fare(order).await.map(|_| ())
  }
}

pub struct ReverseDeliverySweep {
  ctx: Arc<LifecycleContext>,
  reconciler: DeliveryReconciler,
}

impl ReverseDeliverySweep {
  pub fn new(ctx: Arc<LifecycleContext>) -> Self {
    ReverseDeliverySweep {
      reconciler: DeliveryReconciler::new(ctx.clone()),
      ctx,
    }
  }
}

#[async_trait]
impl SweepJob for ReverseDeliverySweep {
  fn name(&self) -> &'static str {
    "delivery-reverse"
  }

  async fn select(&self, now: DateTime<Utc>) -> FlowResult<Vec<Order>> {
    let query = OrderQuery {
      modified_before: Some(now - self.ctx.config.quiet_period),
      with_secure_partner_order: true,
      limit: self.ctx.config.sweep_batch_limit,
      ..OrderQuery::in_statuses(&[OrderStatus::SecureReturnInitiated])
    };
    self.ctx.store().find(&query).await
  }

  async fn process(&self, order: Order) -> FlowResult<()> {
    self.reconciler.reconcile_reverse(order).await.map(|_| ())
  }
}
