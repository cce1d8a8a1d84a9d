// orderflow/src/dispatch.rs

//! Seller decisions on a paid order and the forward shipment that follows an
//! acceptance.

use crate::error::{FlowError, FlowResult};
use crate::lifecycle::LifecycleContext;
use crate::model::{Actor, Address, Customer, Order, OrderItem, Permission, Requester, Role, Seller};
use crate::ports::{ShipmentContact, ShipmentRequest, ShipmentStop};
use crate::status::OrderStatus;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Shortest national number we are willing to strip a country code from.
const MIN_NATIONAL_DIGITS: usize = 10;

/// `+<country_code> <national>`, whatever punctuation or prefix the stored
/// number carries.
pub fn format_phone(raw: &str, country_code: &str) -> String {
  let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
  let digits = digits.trim_start_matches('0');
  let national = match digits.strip_prefix(country_code) {
    Some(rest) if rest.len() >= MIN_NATIONAL_DIGITS => rest,
    _ => digits,
  };
  format!("+{} {}", country_code, national)
}

/// Orders are single-seller; a line from anyone else is a data problem we
/// refuse to guess around.
pub fn ensure_single_seller(order: &Order, items: &[OrderItem]) -> FlowResult<()> {
  if items.iter().any(|i| i.product.seller_id != order.seller_id) {
    return Err(FlowError::MultiSellerOrder { order_id: order.id });
  }
  Ok(())
}

/// Seller decisions need the permission and, for sellers, ownership.
pub(crate) fn ensure_can_decide(requester: &Requester, order: &Order) -> FlowResult<()> {
  if !requester.can(Permission::DecideOrder) {
    return Err(FlowError::Forbidden(format!("{} cannot decide orders", requester.role.as_str())));
  }
  if requester.role == Role::Seller && order.seller_id != requester.user_id {
    return Err(FlowError::Forbidden(format!("order {} belongs to another seller", order.code)));
  }
  Ok(())
}

pub struct DeliveryDispatcher {
  ctx: Arc<LifecycleContext>,
}

impl DeliveryDispatcher {
  pub fn new(ctx: Arc<LifecycleContext>) -> Self {
    DeliveryDispatcher { ctx }
  }

  /// Books the forward shipment and moves the order and its items to
  /// READY_FOR_PICK_UP. Nothing on the order changes when the partner call
  /// fails; once booked, the shipment id is stored before the transition.
  #[instrument(
    name = "DeliveryDispatcher::create_delivery_order",
    skip_all,
    fields(order_id = %order.id, order_code = %order.code),
    err(Display)
  )]
  pub async fn create_delivery_order(
    &self,
    order: &mut Order,
    items: &mut [OrderItem],
    seller: &Seller,
    delivery_address: &Address,
    pickup_address: &Address,
    customer: &Customer,
  ) -> FlowResult<()> {
    crate::authority::TransitionAuthority::check(order.status, OrderStatus::ReadyForPickUp)?;
    let contact = seller
      .primary_contact()
      .ok_or(FlowError::MissingPrimaryContact { seller_id: seller.id })?;

    let mut staged = order.clone();
    if staged.delivery_partner_order_id.is_none() {
      let country_code = &self.ctx.config.phone_country_code;
      let request = ShipmentRequest {
        request_id: order.code.clone(),
        pickup: ShipmentStop {
          contact: ShipmentContact {
            name: contact.name.clone(),
            phone: format_phone(&contact.phone, country_code),
          },
          address: pickup_address.clone(),
        },
        drop: ShipmentStop {
          contact: ShipmentContact {
            name: customer.name.clone(),
            phone: format_phone(&customer.phone, country_code),
          },
          address: delivery_address.clone(),
        },
        instructions: self.ctx.config.handling_instructions.clone(),
      };
      let created = self.ctx.ports.partner.create_shipment(&request).await.map_err(|e| match e {
        FlowError::DeliveryPartner(_) => e,
        other => FlowError::DeliveryPartner(other.to_string()),
      })?;
      info!(shipment_id = %created.shipment_id, fare_estimate = ?created.fare_estimate, "Shipment booked.");
      // The booking is recorded on its own first, so a failed transition
      // below leaves a retry with nothing to book again.
      order.delivery_partner_order_id = Some(created.shipment_id);
      order.fare_details.estimate = created.fare_estimate;
      order.pickup_eta = created.pickup_eta;
      self.ctx.authority.persist(order, &[]).await?;
      staged = order.clone();
    } else {
      warn!("Shipment already booked; finishing the transition only.");
    }
    staged.pickup_address = Some(pickup_address.clone());
    staged.delivery_address = Some(delivery_address.clone());

    self
      .ctx
      .authority
      .transition(&mut staged, items, OrderStatus::ReadyForPickUp, &Actor::system("dispatch"))
      .await?;
    *order = staged;
    Ok(())
  }

  /// Resolves the seller, customer and both addresses, then books.
  async fn dispatch_loaded(&self, order: &mut Order, items: &mut [OrderItem]) -> FlowResult<()> {
    ensure_single_seller(order, items)?;
    let directory = &self.ctx.ports.directory;
    let seller = directory
      .seller(order.seller_id)
      .await?
      .ok_or_else(|| FlowError::NotFound(format!("seller {}", order.seller_id)))?;
    let customer = directory
      .customer(order.user_id)
      .await?
      .ok_or_else(|| FlowError::NotFound(format!("customer {}", order.user_id)))?;
    let delivery_address = order
      .delivery_address
      .clone()
      .ok_or_else(|| FlowError::Validation(format!("order {} has no delivery address", order.code)))?;
    let pickup_address = match seller.store_address_id {
      Some(id) => directory
        .address(id)
        .await?
        .ok_or_else(|| FlowError::NotFound(format!("address {}", id)))?,
      None => {
        return Err(FlowError::Validation(format!(
          "seller {} has no registered store address",
          seller.id
        )))
      }
    };
    self
      .create_delivery_order(order, items, &seller, &delivery_address, &pickup_address, &customer)
      .await
  }

  /// The seller (or an admin) accepts a paid order, which is dispatched right
  /// away. A failed dispatch leaves the order ORDER_ACCEPTED for a retry
  /// through [`Self::dispatch_order`].
  #[instrument(name = "DeliveryDispatcher::accept_order", skip(self, requester), fields(actor = %requester.actor()), err(Display))]
  pub async fn accept_order(&self, requester: &Requester, order_id: Uuid) -> FlowResult<Order> {
    let (mut order, mut items) = self.ctx.load(order_id).await?;
    ensure_can_decide(requester, &order)?;
    ensure_single_seller(&order, &items)?;
    self
      .ctx
      .authority
      .transition(&mut order, &mut items, OrderStatus::OrderAccepted, &requester.actor())
      .await?;

    if let Err(e) = self.dispatch_loaded(&mut order, &mut items).await {
      warn!(%order_id, error = %e, "Order accepted but dispatch failed; awaiting retry.");
    }
    Ok(order)
  }

  #[instrument(name = "DeliveryDispatcher::dispatch_order", skip(self, requester), err(Display))]
  pub async fn dispatch_order(&self, requester: &Requester, order_id: Uuid) -> FlowResult<Order> {
    if !requester.can(Permission::OperateDispatch) {
      return Err(FlowError::Forbidden("dispatch is an operator action".to_string()));
    }
    let (mut order, mut items) = self.ctx.load(order_id).await?;
    self.dispatch_loaded(&mut order, &mut items).await?;
    Ok(order)
  }

  #[instrument(name = "DeliveryDispatcher::mark_store_not_operational", skip(self, requester), err(Display))]
  pub async fn mark_store_not_operational(&self, requester: &Requester, order_id: Uuid) -> FlowResult<Order> {
    let (mut order, mut items) = self.ctx.load(order_id).await?;
    ensure_can_decide(requester, &order)?;
    self
      .ctx
      .authority
      .transition(&mut order, &mut items, OrderStatus::StoreNotOperational, &requester.actor())
      .await?;
    Ok(order)
  }
}
