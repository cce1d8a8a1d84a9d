// orderflow/src/refund.rs

//! Refund compensation for a seller rejection, as a named-step workflow:
//!
//! `record_rejection` -> `zero_product_stock` -> `request_refund` ->
//! `call_refund_gateway` -> `settle_refund_outcome` -> `alert_refund_failure`
//!
//! The two transitions through the authority are what make the refund
//! happen at most once: a second rejection of the same order fails in
//! `record_rejection` before any gateway call.

use crate::dispatch::ensure_can_decide;
use crate::error::{FlowError, FlowResult, WorkflowError};
use crate::lifecycle::LifecycleContext;
use crate::model::{Actor, Order, OrderItem, Requester};
use crate::ports::{Email, RefundResponse};
use crate::status::{map_refund_state, OrderStatus};
use crate::workflow::{ContextData, StepControl, Workflow, WorkflowOutcome};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub const REFUND_WORKFLOW: &str = "order_reject_refund";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundOutcome {
  pub order_id: Uuid,
  pub refund_id: String,
  pub status: OrderStatus,
}

#[derive(Debug, Clone)]
struct RejectionState {
  order: Order,
  items: Vec<OrderItem>,
  remarks: String,
  actor: Actor,
  refund_id: Option<String>,
  gateway_result: Option<RefundResponse>,
}

impl RejectionState {
  /// Set by `request_refund`; nothing after it may run without one.
  fn recorded_refund_id(&self) -> Result<String, WorkflowError> {
    self.refund_id.clone().ok_or_else(|| WorkflowError::IncompleteOutcome {
      workflow: REFUND_WORKFLOW.to_string(),
      missing: "a refund id".to_string(),
    })
  }
}

type RejectionData = ContextData<RejectionState>;

pub struct RefundCompensation {
  ctx: Arc<LifecycleContext>,
}

impl RefundCompensation {
  pub fn new(ctx: Arc<LifecycleContext>) -> Self {
    RefundCompensation { ctx }
  }

  fn workflow(&self) -> FlowResult<Workflow<RejectionState, FlowError>> {
    let mut wf = Workflow::new(
      REFUND_WORKFLOW,
      &[
        ("record_rejection", false),
        ("zero_product_stock", false),
        ("request_refund", false),
        ("call_refund_gateway", false),
        ("settle_refund_outcome", false),
        ("alert_refund_failure", false),
      ],
    );

    let ctx = self.ctx.clone();
    wf.on("record_rejection", move |data: RejectionData| {
      let ctx = ctx.clone();
      async move {
        let (mut order, mut items, actor) = {
          let mut guard = data.write();
          let remarks = guard.remarks.clone();
          guard.order.rejection_remarks = Some(remarks);
          (guard.order.clone(), guard.items.clone(), guard.actor.clone())
        };
        ctx
          .authority
          .transition(&mut order, &mut items, OrderStatus::OrderRejected, &actor)
          .await?;
        let mut guard = data.write();
        guard.order = order;
        guard.items = items;
        Ok::<_, FlowError>(StepControl::Continue)
      }
    })?;

    let ctx = self.ctx.clone();
    wf.on("zero_product_stock", move |data: RejectionData| {
      let ctx = ctx.clone();
      async move {
        let codes: Vec<String> = data.read().items.iter().map(|i| i.product.code.clone()).collect();
        for code in codes {
          if let Err(e) = ctx.ports.inventory.set_available_quantity(&code, 0).await {
            error!(product = %code, error = %e, "Could not zero stock for rejected product.");
          }
        }
        Ok::<_, FlowError>(StepControl::Continue)
      }
    })?;

    let ctx = self.ctx.clone();
    wf.on("request_refund", move |data: RejectionData| {
      let ctx = ctx.clone();
      async move {
        let refund_id = ctx.references.refund_id(ctx.authority.now());
        let (mut order, actor) = {
          let mut guard = data.write();
          guard.order.refund_transaction_id = Some(refund_id.clone());
          guard.refund_id = Some(refund_id.clone());
          (guard.order.clone(), guard.actor.clone())
        };
        ctx
          .authority
          .transition(&mut order, &mut [], OrderStatus::RefundRequested, &actor)
          .await?;
        info!(order_id = %order.id, %refund_id, "Refund requested.");
        data.write().order = order;
        Ok::<_, FlowError>(StepControl::Continue)
      }
    })?;

    let ctx = self.ctx.clone();
    wf.on("call_refund_gateway", move |data: RejectionData| {
      let ctx = ctx.clone();
      async move {
        let (refund_id, code, amount) = {
          let guard = data.read();
          (guard.recorded_refund_id()?, guard.order.code.clone(), guard.order.total_amount)
        };
        let result = match ctx.ports.gateway.refund(&refund_id, &code, amount).await {
          Ok(result) => result,
          Err(e) => {
            warn!(%refund_id, error = %e, "Refund call failed; left in REFUND_REQUESTED.");
            None
          }
        };
        let settled = result.is_some();
        data.write().gateway_result = result;
        // Without an answer the order waits in REFUND_REQUESTED.
        Ok::<_, FlowError>(if settled { StepControl::Continue } else { StepControl::Stop })
      }
    })?;

    let ctx = self.ctx.clone();
    wf.on("settle_refund_outcome", move |data: RejectionData| {
      let ctx = ctx.clone();
      async move {
        let (mut order, state) = {
          let guard = data.read();
          let state = guard.gateway_result.as_ref().map(|r| r.state.clone()).unwrap_or_default();
          (guard.order.clone(), state)
        };
        let target = map_refund_state(&state);
        ctx
          .authority
          .transition(&mut order, &mut [], target, &Actor::system("refund-gateway"))
          .await?;
        info!(order_id = %order.id, status = %target, gateway_state = %state, "Refund outcome recorded.");
        data.write().order = order;
        Ok::<_, FlowError>(StepControl::Continue)
      }
    })?;

    let ctx = self.ctx.clone();
    wf.on("alert_refund_failure", move |data: RejectionData| {
      let ctx = ctx.clone();
      async move {
        let (order_code, refund_id, amount) = {
          let guard = data.read();
          (guard.order.code.clone(), guard.recorded_refund_id()?, guard.order.total_amount)
        };
        let email = Email {
          to: ctx.config.ops_alert_email.clone(),
          subject: format!("Refund failed for order {}", order_code),
          body: format!(
            "Refund {} of {} (minor units) for order {} was reported FAILED by the gateway. Manual follow-up required.",
            refund_id, amount, order_code
          ),
        };
        if let Err(e) = ctx.ports.notifier.enqueue(email).await {
          error!(%order_code, error = %e, "Refund failure alert not queued.");
        }
        Ok::<_, FlowError>(StepControl::Continue)
      }
    })?;
    wf.skip_if("alert_refund_failure", |state: &RejectionState| {
      state.order.status != OrderStatus::RefundFailed
    })?;

    Ok(wf)
  }

  /// Seller rejection of a paid order followed by the refund. Gateway
  /// silence is not an error: the order stays REFUND_REQUESTED.
  #[instrument(name = "RefundCompensation::process_order_reject", skip(self, requester, remarks), fields(actor = %requester.actor()), err(Display))]
  pub async fn process_order_reject(&self, requester: &Requester, order_id: Uuid, remarks: &str) -> FlowResult<RefundOutcome> {
    let remarks = remarks.trim();
    if remarks.is_empty() {
      return Err(FlowError::Validation("rejection remarks are required".to_string()));
    }
    let (order, items) = self.ctx.load(order_id).await?;
    ensure_can_decide(requester, &order)?;

    let data = ContextData::new(RejectionState {
      order,
      items,
      remarks: remarks.to_string(),
      actor: requester.actor(),
      refund_id: None,
      gateway_result: None,
    });
    let workflow = self.workflow()?;
    let run = workflow.run(data.clone()).await?;

    let state = data.snapshot();
    let refund_id = state.recorded_refund_id()?;
    if run == WorkflowOutcome::Stopped {
      info!(%order_id, %refund_id, "Refund awaiting gateway outcome.");
    }
    Ok(RefundOutcome {
      order_id,
      refund_id,
      status: state.order.status,
    })
  }
}
