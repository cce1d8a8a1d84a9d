// orderflow/src/payment.rs

//! Payment reconciliation: confirms a pending order against the gateway and,
//! the first time it turns paid, runs the post-payment side effects.

use crate::error::{FlowError, FlowResult};
use crate::lifecycle::LifecycleContext;
use crate::model::{Actor, Order, OrderItem};
use crate::ports::Email;
use crate::scheduler::SweepJob;
use crate::status::{map_payment_state, OrderStatus};
use crate::store::{require_order, OrderQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub struct PaymentReconciler {
  ctx: Arc<LifecycleContext>,
}

impl PaymentReconciler {
  pub fn new(ctx: Arc<LifecycleContext>) -> Self {
    PaymentReconciler { ctx }
  }

  /// Returns `true` only for the call that moved the order to
  /// TRANSACTION_PROCESSED.
  #[instrument(name = "PaymentReconciler::reconcile_payment", skip(self), err(Display))]
  pub async fn reconcile_payment(&self, order_id: Uuid) -> FlowResult<bool> {
    let order = require_order(self.ctx.store(), order_id).await?;
    self.reconcile(order).await
  }

  pub(crate) async fn reconcile(&self, mut order: Order) -> FlowResult<bool> {
    if order.is_paid() {
      debug!(order_id = %order.id, "Already paid, nothing to reconcile.");
      return Ok(false);
    }
    if order.status != OrderStatus::TransactionPending {
      debug!(order_id = %order.id, status = %order.status, "Payment already settled one way or the other.");
      return Ok(false);
    }

    // Items are read alongside the order so a concurrent winner shows up as a
    // version conflict rather than as items already past the target.
    let mut items = self.ctx.store().items(order.id).await?;
    let read_version = order.version;

    let response = self.ctx.ports.gateway.order_status(&order.code).await?;
    let attempt = response
      .as_ref()
      .and_then(|r| r.payment_attempts.last())
      .ok_or_else(|| FlowError::GatewayUnavailable(format!("no payment attempts reported for order {}", order.code)))?
      .clone();

    let Some(target) = map_payment_state(&attempt.state) else {
      debug!(order_id = %order.id, state = %attempt.state, "Payment still in flight.");
      return Ok(false);
    };

    order.payment_status = Some(attempt.state.clone());
    order.payment_mode = attempt.mode.clone();
    order.transaction_id = attempt.transaction_id.clone();

    let actor = Actor::system("payment-reconciler");
    if let Err(e) = self.ctx.authority.transition(&mut order, &mut items, target, &actor).await {
      // Whatever the failure, an order that moved on since it was read means
      // someone else settled it first; their outcome stands.
      let fresh = require_order(self.ctx.store(), order.id).await?;
      if fresh.version != read_version && (fresh.is_paid() || fresh.status != OrderStatus::TransactionPending) {
        info!(order_id = %order.id, status = %fresh.status, error = %e, "Lost the race to a concurrent reconciliation.");
        return Ok(false);
      }
      return Err(e);
    }

    info!(order_id = %order.id, status = %order.status, "Payment reconciled.");
    if target != OrderStatus::TransactionProcessed {
      return Ok(false);
    }
    self.after_payment(&order, &items).await;
    Ok(true)
  }

  /// Runs once per order, after the commit that marked it paid. Failures are
  /// logged; the payment itself is already recorded.
  async fn after_payment(&self, order: &Order, items: &[OrderItem]) {
    let ports = &self.ctx.ports;
    for item in items {
      if let Err(e) = ports.inventory.decrement_quantity(&item.product.code, item.quantity).await {
        error!(order_id = %order.id, product = %item.product.code, error = %e, "Inventory decrement failed.");
      }
    }

    let codes: Vec<String> = items.iter().map(|i| i.product.code.clone()).collect();
    if let Err(e) = ports.cart.remove_items(order.user_id, &codes).await {
      warn!(order_id = %order.id, error = %e, "Could not clear purchased lines from the cart.");
    }

    match ports.directory.seller(order.seller_id).await {
      Ok(Some(seller)) => {
        let email = Email {
          to: seller.email.clone(),
          subject: format!("New order {}", order.code),
          body: format!(
            "Order {} for {} item(s), total {} (minor units), is paid and waiting for your decision.",
            order.code,
            items.len(),
            order.total_amount
          ),
        };
        if let Err(e) = ports.notifier.enqueue(email).await {
          warn!(order_id = %order.id, error = %e, "Seller notification not queued.");
        }
      }
      Ok(None) => warn!(order_id = %order.id, seller_id = %order.seller_id, "Seller not found for notification."),
      Err(e) => warn!(order_id = %order.id, error = %e, "Seller lookup failed."),
    }
  }
}

/// Background confirmation of orders that never came back through the
/// status endpoint.
pub struct PaymentSweep {
  ctx: Arc<LifecycleContext>,
  reconciler: PaymentReconciler,
}

impl PaymentSweep {
  pub fn new(ctx: Arc<LifecycleContext>) -> Self {
    PaymentSweep {
      reconciler: PaymentReconciler::new(ctx.clone()),
      ctx,
    }
  }
}

#[async_trait]
impl SweepJob for PaymentSweep {
  fn name(&self) -> &'static str {
    "payment"
  }

  async fn select(&self, now: DateTime<Utc>) -> FlowResult<Vec<Order>> {
    let query = OrderQuery {
      modified_before: Some(now - self.ctx.config.quiet_period),
      limit: self.ctx.config.sweep_batch_limit,
      ..OrderQuery::in_statuses(&[OrderStatus::TransactionPending])
    };
    self.ctx.store().find(&query).await
  }

  async fn process(&self, order: Order) -> FlowResult<()> {
    self.reconciler.reconcile(order).await.map(|_| ())
  }
}
