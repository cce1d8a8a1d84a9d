// orderflow/src/secure_return.rs

//! Secure returns: the customer schedules a pickup of delivered secure items,
//! the dispatch sweep books the reverse shipment when the slot comes round,
//! and the seller appraises what came back.

use crate::authority::TransitionAuthority;
use crate::dispatch::format_phone;
use crate::error::{FlowError, FlowResult};
use crate::lifecycle::LifecycleContext;
use crate::model::{Actor, Address, Amount, ItemType, Order, OrderItem, Permission, Requester, TimeSlot};
use crate::ports::{ShipmentContact, ShipmentRequest, ShipmentStop};
use crate::scheduler::{run_sweep, SweepJob, SweepReport};
use crate::status::OrderStatus;
use crate::store::OrderQuery;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecureReturnRequest {
  pub order_id: Option<Uuid>,
  pub date: Option<NaiveDate>,
  #[serde(default)]
  pub item_ids: Vec<Uuid>,
  /// `HH:MM-HH:MM`.
  pub time_slot: Option<String>,
  pub pickup_address_id: Option<Uuid>,
  /// Where the seller takes the items back; defaults to the store address.
  pub delivery_address_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppraisalRequest {
  pub order_id: Option<Uuid>,
  pub amount: Option<Amount>,
  pub remark: Option<String>,
}

/// Validated shape of a [`SecureReturnRequest`].
struct ReturnPlan {
  order_id: Uuid,
  date: NaiveDate,
  slot: TimeSlot,
  item_ids: Vec<Uuid>,
  pickup_address_id: Uuid,
}

/// A scheduled return is due once its slot has opened, including slots that
/// already closed without a dispatch.
pub fn is_due(order: &Order, business_now: NaiveDateTime) -> bool {
  match (order.secured_date, order.secured_time_slot) {
    (Some(date), Some(slot)) => {
      date < business_now.date() || (date == business_now.date() && slot.start <= business_now.time())
    }
    _ => false,
  }
}

pub struct SecureReturnWorkflow {
  ctx: Arc<LifecycleContext>,
}

impl SecureReturnWorkflow {
  pub fn new(ctx: Arc<LifecycleContext>) -> Self {
    SecureReturnWorkflow { ctx }
  }

  fn validate(&self, request: &SecureReturnRequest, today: NaiveDate) -> FlowResult<ReturnPlan> {
    let order_id = request
      .order_id
      .ok_or_else(|| FlowError::Validation("order_id is required".to_string()))?;
    let date = request
      .date
      .ok_or_else(|| FlowError::Validation("date is required".to_string()))?;
    if date <= today {
      return Err(FlowError::Validation(format!("return date {} must be in the future", date)));
    }
    if request.item_ids.is_empty() {
      return Err(FlowError::Validation("at least one item is required".to_string()));
    }
    let raw_slot = request
      .time_slot
      .as_deref()
      .ok_or_else(|| FlowError::Validation("time_slot is required".to_string()))?;
    let slot = TimeSlot::parse(raw_slot).map_err(FlowError::Validation)?;
    if !self.ctx.config.is_within_operating_hours(&slot) {
      return Err(FlowError::Validation(format!(
        "time slot {} is outside operating hours {}",
        slot, self.ctx.config.operating_hours
      )));
    }
    let pickup_address_id = request
      .pickup_address_id
      .ok_or_else(|| FlowError::Validation("pickup_address_id is required".to_string()))?;
    Ok(ReturnPlan {
      order_id,
      date,
      slot,
      item_ids: request.item_ids.clone(),
      pickup_address_id,
    })
  }

  async fn owned_address(&self, id: Uuid, owner: Uuid, role: &str) -> FlowResult<Address> {
    let address = self
      .ctx
      .ports
      .directory
      .address(id)
      .await?
      .ok_or_else(|| FlowError::NotFound(format!("address {}", id)))?;
    if address.owner_id != owner {
      return Err(FlowError::Validation(format!("address {} does not belong to the {}", id, role)));
    }
    Ok(address)
  }

  #[instrument(name = "SecureReturnWorkflow::initiate_secure_return", skip_all, fields(actor = %requester.actor(), order_id = ?request.order_id), err(Display))]
  pub async fn initiate_secure_return(&self, requester: &Requester, request: SecureReturnRequest) -> FlowResult<Order> {
    if !requester.can(Permission::ScheduleSecureReturn) {
      return Err(FlowError::Forbidden("only customers can schedule a secure return".to_string()));
    }
    let today = self.ctx.config.business_now(self.ctx.authority.now()).date();
    let plan = self.validate(&request, today)?;

    let (mut order, items) = self.ctx.load(plan.order_id).await?;
    if order.user_id != requester.user_id {
      return Err(FlowError::Forbidden(format!("order {} belongs to another customer", order.code)));
    }
    TransitionAuthority::check(order.status, OrderStatus::SecureReturnScheduled)?;

    let ordered_on = order.created_at.with_timezone(&self.ctx.config.business_offset()).date_naive();
    let latest = ordered_on + Duration::days(self.ctx.config.secure_return_max_days);
    if plan.date > latest {
      return Err(FlowError::Validation(format!(
        "return date {} is past the last allowed date {}",
        plan.date, latest
      )));
    }

    let mut selected: Vec<OrderItem> = Vec::with_capacity(plan.item_ids.len());
    for item_id in &plan.item_ids {
      let item = items
        .iter()
        .find(|i| i.id == *item_id)
        .ok_or_else(|| FlowError::Validation(format!("item {} is not part of order {}", item_id, order.code)))?;
      if item.item_type == ItemType::Buy {
        return Err(FlowError::Validation(format!("item {} was bought outright and cannot be returned", item_id)));
      }
      if item.status != OrderStatus::Delivered {
        return Err(FlowError::Validation(format!("item {} is {}, not DELIVERED", item_id, item.status)));
      }
      if !selected.iter().any(|s| s.id == item.id) {
        selected.push(item.clone());
      }
    }

    let seller = self
      .ctx
      .ports
      .directory
      .seller(order.seller_id)
      .await?
      .ok_or_else(|| FlowError::NotFound(format!("seller {}", order.seller_id)))?;
    let weekday = plan.date.weekday();
    if seller.weekly_off_days.contains(&weekday) {
      return Err(FlowError::Validation(format!(
        "{} is closed on {:?}s; pick another date",
        seller.store_name, weekday
      )));
    }

    let pickup = self.owned_address(plan.pickup_address_id, order.user_id, "customer").await?;
    let drop_id = request
      .delivery_address_id
      .or(seller.store_address_id)
      .ok_or_else(|| FlowError::Validation(format!("seller {} has no return address", seller.id)))?;
    let return_to = self.owned_address(drop_id, seller.id, "seller").await?;

    order.secured_date = Some(plan.date);
    order.secured_time_slot = Some(plan.slot);
    order.secure_pickup_address = Some(pickup);
    order.secure_delivery_address = Some(return_to);
    self
      .ctx
      .authority
      .transition(&mut order, &mut selected, OrderStatus::SecureReturnScheduled, &requester.actor())
      .await?;
    info!(date = %plan.date, slot = %plan.slot, items = selected.len(), "Secure return scheduled.");
    Ok(order)
  }

  async fn fail(&self, mut order: Order, mut items: Vec<OrderItem>, reason: String) -> FlowResult<()> {
    warn!(order_id = %order.id, %reason, "Secure return cannot be dispatched.");
    order.secure_return_failure_reason = Some(reason);
    self
      .ctx
      .authority
      .transition(&mut order, &mut items, OrderStatus::SecureReturnFailed, &Actor::system("secure-return"))
      .await
  }

  /// Books the reverse shipment for one scheduled return. Missing records
  /// fail the return for good; a partner error leaves it scheduled.
  #[instrument(name = "SecureReturnWorkflow::dispatch_return", skip_all, fields(order_id = %order.id), err(Display))]
  pub async fn dispatch_return(&self, mut order: Order) -> FlowResult<()> {
    if order.status != OrderStatus::SecureReturnScheduled {
      return Ok(());
    }
    let items: Vec<OrderItem> = self
      .ctx
      .store()
      .items(order.id)
      .await?
      .into_iter()
      .filter(|i| i.status == OrderStatus::SecureReturnScheduled)
      .collect();
    if items.is_empty() {
      return self.fail(order, items, "No items are scheduled for return".to_string()).await;
    }
    let directory = &self.ctx.ports.directory;
    let Some(seller) = directory.seller(order.seller_id).await? else {
      let reason = format!("Seller {} not found", order.seller_id);
      return self.fail(order, items, reason).await;
    };
    let Some(customer) = directory.customer(order.user_id).await? else {
      let reason = format!("Customer {} not found", order.user_id);
      return self.fail(order, items, reason).await;
    };
    let Some(contact) = seller.primary_contact().cloned() else {
      return self.fail(order, items, format!("Seller {} has no primary contact", seller.id)).await;
    };
    let (Some(pickup), Some(return_to)) = (order.secure_pickup_address.clone(), order.secure_delivery_address.clone())
    else {
      return self.fail(order, items, "Return addresses missing".to_string()).await;
    };

    let secure_order_id = match order.secure_order_id.clone() {
      Some(id) => id,
      None => {
        let id = self.ctx.references.secure_order_id(self.ctx.authority.now());
        order.secure_order_id = Some(id.clone());
        self.ctx.authority.persist(&mut order, &[]).await?;
        id
      }
    };

    if order.secure_dp_order_id.is_none() {
      let country_code = &self.ctx.config.phone_country_code;
      let request = ShipmentRequest {
        request_id: secure_order_id.clone(),
        pickup: ShipmentStop {
          contact: ShipmentContact {
            name: customer.name.clone(),
            phone: format_phone(&customer.phone, country_code),
          },
          address: pickup,
        },
        drop: ShipmentStop {
          contact: ShipmentContact {
            name: contact.name.clone(),
            phone: format_phone(&contact.phone, country_code),
          },
          address: return_to,
        },
        instructions: self.ctx.config.handling_instructions.clone(),
      };
      let created = self.ctx.ports.partner.create_shipment(&request).await.map_err(|e| {
        if e.is_external() {
          e
        } else {
          FlowError::DeliveryPartner(e.to_string())
        }
      })?;
      order.secure_dp_order_id = Some(created.shipment_id);
      // Stored ahead of the transition so a retry never books twice.
      self.ctx.authority.persist(&mut order, &[]).await?;
    }

    let mut items = items;
    self
      .ctx
      .authority
      .transition(&mut order, &mut items, OrderStatus::SecureReturnInitiated, &Actor::system("secure-return"))
      .await?;
    info!(%secure_order_id, shipment_id = ?order.secure_dp_order_id, "Return pickup booked.");
    Ok(())
  }

  /// One dispatch pass at `now`.
  pub async fn process(&self, now: DateTime<Utc>) -> FlowResult<SweepReport> {
    let job = SecureReturnDispatchSweep::new(self.ctx.clone());
    run_sweep(&job, now, self.ctx.config.sweep_concurrency).await
  }

  #[instrument(name = "SecureReturnWorkflow::appraise_secure_return", skip_all, fields(actor = %requester.actor(), order_id = ?request.order_id), err(Display))]
  pub async fn appraise_secure_return(&self, requester: &Requester, request: AppraisalRequest) -> FlowResult<Order> {
    if !requester.can(Permission::AppraiseSecureReturn) {
      return Err(FlowError::Forbidden("only sellers can appraise returns".to_string()));
    }
    let order_id = request
      .order_id
      .ok_or_else(|| FlowError::Validation("order_id is required".to_string()))?;
    let amount = request
      .amount
      .filter(|a| *a > 0)
      .ok_or_else(|| FlowError::Validation("appraisal amount must be positive".to_string()))?;

    let (mut order, _) = self.ctx.load(order_id).await?;
    if order.seller_id != requester.user_id {
      return Err(FlowError::Forbidden(format!("order {} belongs to another seller", order.code)));
    }
    if order.status != OrderStatus::SecureReturnCompleted {
      return Err(FlowError::Validation(format!(
        "order {} is {}; only completed returns can be appraised",
        order.code, order.status
      )));
    }
    if order.appraised_at.is_some() {
      warn!("Overwriting an earlier appraisal.");
    }
    order.appraisal_amount = Some(amount);
    order.appraisal_remark = request.remark.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    order.appraised_at = Some(self.ctx.authority.now());
    self.ctx.authority.persist(&mut order, &[]).await?;
    info!(amount, "Return appraised.");
    Ok(order)
  }
}

pub struct SecureReturnDispatchSweep {
  ctx: Arc<LifecycleContext>,
  workflow: SecureReturnWorkflow,
}

impl SecureReturnDispatchSweep {
  pub fn new(ctx: Arc<LifecycleContext>) -> Self {
    SecureReturnDispatchSweep {
      workflow: SecureReturnWorkflow::new(ctx.clone()),
      ctx,
    }
  }
}

#[async_trait]
impl SweepJob for SecureReturnDispatchSweep {
  fn name(&self) -> &'static str {
    "secure-return-dispatch"
  }

  async fn select(&self, now: DateTime<Utc>) -> FlowResult<Vec<Order>> {
    // Due-ness is part of the query so returns booked for later days never
    // use up the batch.
    let query = OrderQuery {
      return_due_by: Some(self.ctx.config.business_now(now)),
      limit: self.ctx.config.sweep_batch_limit,
      ..OrderQuery::in_statuses(&[OrderStatus::SecureReturnScheduled])
    };
    self.ctx.store().find(&query).await
  }

  async fn process(&self, order: Order) -> FlowResult<()> {
    self.workflow.dispatch_return(order).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::NaiveTime;

  fn scheduled(date: &str, slot: &str) -> Order {
    let mut order = Order::new("ORD-S", Uuid::new_v4(), Uuid::new_v4(), 100, Utc::now());
    order.secured_date = Some(date.parse().unwrap());
    order.secured_time_slot = Some(TimeSlot::parse(slot).unwrap());
    order
  }

  fn at(date: &str, time: &str) -> NaiveDateTime {
    NaiveDateTime::new(date.parse().unwrap(), NaiveTime::parse_from_str(time, "%H:%M").unwrap())
  }

  #[test]
  fn due_once_the_slot_opens() {
    let order = scheduled("2026-05-10", "10:00-12:00");
    assert!(!is_due(&order, at("2026-05-09", "11:00")));
    assert!(!is_due(&order, at("2026-05-10", "09:59")));
    assert!(is_due(&order, at("2026-05-10", "10:00")));
    // Missed slots are still picked up.
    assert!(is_due(&order, at("2026-05-10", "15:00")));
    assert!(is_due(&order, at("2026-05-11", "08:00")));
  }
}
