// orderflow/src/lifecycle.rs

//! Wiring: the collaborator set, the shared context every service reads, and
//! the `OrderLifecycle` facade used by the HTTP layer and the sweeper.

use crate::authority::TransitionAuthority;
use crate::config::LifecycleConfig;
use crate::delivery::{CancelledFareSweep, DeliveryReconciler, DeliveryUpdate, ForwardDeliverySweep, ReverseDeliverySweep};
use crate::dispatch::DeliveryDispatcher;
use crate::error::FlowResult;
use crate::model::{Order, OrderItem, Requester};
use crate::payment::{PaymentReconciler, PaymentSweep};
use crate::ports::{Cart, Clock, DeliveryPartner, Directory, Inventory, Notifier, PaymentGateway, ShipmentStatus};
use crate::reference::ReferenceGenerator;
use crate::refund::{RefundCompensation, RefundOutcome};
use crate::scheduler::Sweeper;
use crate::secure_return::{AppraisalRequest, SecureReturnDispatchSweep, SecureReturnRequest, SecureReturnWorkflow};
use crate::settlement::{settle, SettlementBreakdown};
use crate::store::{require_order, OrderStore};
use std::sync::Arc;
use uuid::Uuid;

/// Everything outside the engine that it talks to.
#[derive(Clone)]
pub struct Collaborators {
  pub store: Arc<dyn OrderStore>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub partner: Arc<dyn DeliveryPartner>,
  pub inventory: Arc<dyn Inventory>,
  pub cart: Arc<dyn Cart>,
  pub directory: Arc<dyn Directory>,
  pub notifier: Arc<dyn Notifier>,
  pub clock: Arc<dyn Clock>,
}

pub struct LifecycleContext {
  pub authority: TransitionAuthority,
  pub ports: Collaborators,
  pub config: LifecycleConfig,
  pub references: ReferenceGenerator,
}

impl LifecycleContext {
  pub fn new(ports: Collaborators, config: LifecycleConfig) -> Arc<Self> {
    Arc::new(LifecycleContext {
      authority: TransitionAuthority::new(ports.store.clone(), ports.clock.clone()),
      ports,
      config,
      references: ReferenceGenerator::new(),
    })
  }

  pub fn store(&self) -> &dyn OrderStore {
    self.ports.store.as_ref()
  }

  pub async fn load(&self, order_id: Uuid) -> FlowResult<(Order, Vec<OrderItem>)> {
    let order = require_order(self.store(), order_id).await?;
    let items = self.store().items(order_id).await?;
    Ok((order, items))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SettlementView {
  pub order_id: Uuid,
  pub is_payout_done: bool,
  pub breakdown: SettlementBreakdown,
}

pub struct OrderLifecycle {
  ctx: Arc<LifecycleContext>,
  pub payments: PaymentReconciler,
  pub dispatcher: DeliveryDispatcher,
  pub delivery: DeliveryReconciler,
  pub refunds: RefundCompensation,
  pub secure_returns: SecureReturnWorkflow,
}

impl OrderLifecycle {
  pub fn new(ports: Collaborators, config: LifecycleConfig) -> Self {
    let ctx = LifecycleContext::new(ports, config);
    OrderLifecycle {
      payments: PaymentReconciler::new(ctx.clone()),
      dispatcher: DeliveryDispatcher::new(ctx.clone()),
      delivery: DeliveryReconciler::new(ctx.clone()),
      refunds: RefundCompensation::new(ctx.clone()),
      secure_returns: SecureReturnWorkflow::new(ctx.clone()),
      ctx,
    }
  }

  pub fn context(&self) -> &Arc<LifecycleContext> {
    &self.ctx
  }

  pub fn config(&self) -> &LifecycleConfig {
    &self.ctx.config
  }

  /// Current order state, reconciling payment first while it is still pending.
  /// Gateway trouble does not fail the read.
  pub async fn order_status(&self, order_id: Uuid) -> FlowResult<Order> {
    let order = require_order(self.ctx.store(), order_id).await?;
    if !order.is_paid() && order.status == crate::status::OrderStatus::TransactionPending {
      match self.payments.reconcile_payment(order_id).await {
        Ok(_) => {}
        Err(e) if e.is_external() => {
          tracing::warn!(%order_id, error = %e, "Payment status check failed; returning stored state.");
        }
        Err(e) => return Err(e),
      }
      return require_order(self.ctx.store(), order_id).await;
    }
    Ok(order)
  }

  pub async fn accept_order(&self, requester: &Requester, order_id: Uuid) -> FlowResult<Order> {
    self.dispatcher.accept_order(requester, order_id).await
  }

  pub async fn mark_store_not_operational(&self, requester: &Requester, order_id: Uuid) -> FlowResult<Order> {
    self.dispatcher.mark_store_not_operational(requester, order_id).await
  }

  pub async fn dispatch_order(&self, requester: &Requester, order_id: Uuid) -> FlowResult<Order> {
    self.dispatcher.dispatch_order(requester, order_id).await
  }

  pub async fn reject_order(&self, requester: &Requester, order_id: Uuid, remarks: &str) -> FlowResult<RefundOutcome> {
    self.refunds.process_order_reject(requester, order_id, remarks).await
  }

  pub async fn initiate_secure_return(&self, requester: &Requester, request: SecureReturnRequest) -> FlowResult<Order> {
    self.secure_returns.initiate_secure_return(requester, request).await
  }

  pub async fn appraise_secure_return(&self, requester: &Requester, request: AppraisalRequest) -> FlowResult<Order> {
    self.secure_returns.appraise_secure_return(requester, request).await
  }

  pub async fn apply_delivery_update(&self, partner_order_id: &str, update: &ShipmentStatus) -> FlowResult<DeliveryUpdate> {
    self.delivery.apply_webhook(partner_order_id, update).await
  }

  pub async fn settlement(&self, order_id: Uuid) -> FlowResult<SettlementView> {
    let order = require_order(self.ctx.store(), order_id).await?;
    let breakdown = order.settlement_details.unwrap_or_else(|| {
      settle(
        order.total_amount,
        self.ctx.config.platform_fee_bps,
        self.ctx.config.tax_on_fee_bps,
        order.fare_details.actual.or(order.fare_details.estimate).unwrap_or(0),
      )
    });
    Ok(SettlementView {
      order_id,
      is_payout_done: order.is_payout_done,
      breakdown,
    })
  }

  /// A sweeper carrying every background job, in dependency order.
  pub fn sweeper(&self) -> Sweeper {
    let config = &self.ctx.config;
    Sweeper::new(self.ctx.ports.clock.clone(), config.sweep_interval, config.sweep_concurrency)
      .with_job(Arc::new(PaymentSweep::new(self.ctx.clone())))
      .with_job(Arc::new(ForwardDeliverySweep::new(self.ctx.clone())))
      .with_job(Arc::new(CancelledFareSweep::new(self.ctx.clone())))
      .with_job(Arc::new(SecureReturnDispatchSweep::new(self.ctx.clone())))
      .with_job(Arc::new(ReverseDeliverySweep::new(self.ctx.clone())))
  }
}
