// orderflow/src/testkit.rs

//! Scriptable in-process fakes for every port, plus a `World` that wires them
//! into an `OrderLifecycle` over an in-memory store. Enabled for this crate's
//! own tests and, through the `testkit` feature, for dependants.

use crate::config::LifecycleConfig;
use crate::error::{FlowError, FlowResult};
use crate::lifecycle::{Collaborators, OrderLifecycle};
use crate::model::{Address, Amount, Customer, ItemType, Order, OrderItem, ProductSnapshot, Seller, SellerContact};
use crate::ports::{
  Cart, CheckoutResponse, Clock, DeliveryPartner, Directory, Email, Inventory, Notifier, PaymentAttempt, PaymentGateway,
  PaymentStatusResponse, RefundResponse, ShipmentCreated, ShipmentFare, ShipmentRequest, ShipmentStatus,
};
use crate::status::OrderStatus;
use crate::store::{InMemoryOrderStore, OrderQuery, OrderStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc, Weekday};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// --- Clock ---

#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn at(now: DateTime<Utc>) -> Self {
    ManualClock { now: Mutex::new(now) }
  }

  pub fn set(&self, now: DateTime<Utc>) {
    *self.now.lock() = now;
  }

  pub fn advance(&self, by: Duration) {
    *self.now.lock() += by;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock()
  }
}

// --- Payment gateway ---

#[derive(Debug, Clone)]
pub enum RefundScript {
  Respond(String),
  Silent,
  Unreachable,
}

pub struct FakeGateway {
  statuses: Mutex<HashMap<String, PaymentStatusResponse>>,
  refund_script: Mutex<RefundScript>,
  status_delay: Mutex<Option<std::time::Duration>>,
  pub status_calls: AtomicUsize,
  pub refund_calls: AtomicUsize,
}

impl Default for FakeGateway {
  fn default() -> Self {
    FakeGateway {
      statuses: Mutex::new(HashMap::new()),
      refund_script: Mutex::new(RefundScript::Respond("COMPLETED".to_string())),
      status_delay: Mutex::new(None),
      status_calls: AtomicUsize::new(0),
      refund_calls: AtomicUsize::new(0),
    }
  }
}

impl FakeGateway {
  /// Scripts the attempts the gateway reports for `order_code`, oldest first.
  pub fn set_attempts(&self, order_code: &str, states: &[&str]) {
    let attempts = states
      .iter()
      .enumerate()
      .map(|(i, state)| PaymentAttempt {
        state: state.to_string(),
        mode: Some("UPI".to_string()),
        transaction_id: Some(format!("TXN-{}-{}", order_code, i + 1)),
      })
      .collect();
    self
      .statuses
      .lock()
      .insert(order_code.to_string(), PaymentStatusResponse { payment_attempts: attempts });
  }

  pub fn script_refund(&self, script: RefundScript) {
    *self.refund_script.lock() = script;
  }

  /// Holds every status response for `delay`, to widen race windows.
  pub fn delay_status(&self, delay: std::time::Duration) {
    *self.status_delay.lock() = Some(delay);
  }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
  async fn create_order(&self, order_code: &str, _amount: Amount) -> FlowResult<CheckoutResponse> {
    Ok(CheckoutResponse {
      redirect_url: Some(format!("https://pay.test/{}", order_code)),
      gateway_order_id: Some(order_code.to_string()),
    })
  }

  async fn order_status(&self, order_code: &str) -> FlowResult<Option<PaymentStatusResponse>> {
    self.status_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *self.status_delay.lock();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    Ok(self.statuses.lock().get(order_code).cloned())
  }

  async fn refund(&self, _refund_id: &str, _order_code: &str, _amount: Amount) -> FlowResult<Option<RefundResponse>> {
    self.refund_calls.fetch_add(1, Ordering::SeqCst);
    let script = self.refund_script.lock().clone();
    match script {
      RefundScript::Respond(state) => Ok(Some(RefundResponse { state })),
      RefundScript::Silent => Ok(None),
      RefundScript::Unreachable => Err(FlowError::GatewayUnavailable("refund endpoint timed out".to_string())),
    }
  }
}

// --- Delivery partner ---

#[derive(Default)]
pub struct FakePartner {
  created: Mutex<Vec<ShipmentRequest>>,
  statuses: Mutex<HashMap<String, ShipmentStatus>>,
  fail_create: AtomicBool,
  next_id: AtomicUsize,
}

impl FakePartner {
  pub fn created(&self) -> Vec<ShipmentRequest> {
    self.created.lock().clone()
  }

  pub fn fail_bookings(&self, fail: bool) {
    self.fail_create.store(fail, Ordering::SeqCst);
  }

  pub fn set_status(&self, shipment_id: &str, status: &str, fare: Option<ShipmentFare>) {
    self.statuses.lock().insert(
      shipment_id.to_string(),
      ShipmentStatus {
        status: status.to_string(),
        fare,
      },
    );
  }
}

#[async_trait]
impl DeliveryPartner for FakePartner {
  async fn create_shipment(&self, request: &ShipmentRequest) -> FlowResult<ShipmentCreated> {
    if self.fail_create.load(Ordering::SeqCst) {
      return Err(FlowError::DeliveryPartner("booking rejected".to_string()));
    }
    self.created.lock().push(request.clone());
    let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let shipment_id = format!("SHP-{}", n);
    self.set_status(&shipment_id, "open", None);
    Ok(ShipmentCreated {
      shipment_id,
      fare_estimate: Some(4_500),
      pickup_eta: None,
    })
  }

  async fn shipment(&self, shipment_id: &str) -> FlowResult<ShipmentStatus> {
    self
      .statuses
      .lock()
      .get(shipment_id)
      .cloned()
      .ok_or_else(|| FlowError::DeliveryPartner(format!("unknown shipment {}", shipment_id)))
  }
}

// --- Inventory / cart ---

#[derive(Default)]
pub struct FakeInventory {
  quantities: Mutex<HashMap<String, i32>>,
  pub decrement_calls: AtomicUsize,
}

impl FakeInventory {
  pub fn stock(&self, code: &str, quantity: i32) {
    self.quantities.lock().insert(code.to_string(), quantity);
  }

  pub fn quantity(&self, code: &str) -> Option<i32> {
    self.quantities.lock().get(code).copied()
  }
}

#[async_trait]
impl Inventory for FakeInventory {
  async fn decrement_quantity(&self, product_code: &str, quantity: i32) -> FlowResult<()> {
    self.decrement_calls.fetch_add(1, Ordering::SeqCst);
    let mut quantities = self.quantities.lock();
    let entry = quantities.entry(product_code.to_string()).or_insert(0);
    *entry = (*entry - quantity).max(0);
    Ok(())
  }

  async fn set_available_quantity(&self, product_code: &str, quantity: i32) -> FlowResult<()> {
    self.quantities.lock().insert(product_code.to_string(), quantity);
    Ok(())
  }
}

#[derive(Default)]
pub struct FakeCart {
  lines: Mutex<HashMap<Uuid, Vec<String>>>,
}

impl FakeCart {
  pub fn put(&self, user_id: Uuid, code: &str) {
    self.lines.lock().entry(user_id).or_default().push(code.to_string());
  }

  pub fn lines(&self, user_id: Uuid) -> Vec<String> {
    self.lines.lock().get(&user_id).cloned().unwrap_or_default()
  }
}

#[async_trait]
impl Cart for FakeCart {
  async fn remove_items(&self, user_id: Uuid, product_codes: &[String]) -> FlowResult<()> {
    if let Some(lines) = self.lines.lock().get_mut(&user_id) {
      lines.retain(|code| !product_codes.contains(code));
    }
    Ok(())
  }
}

// --- Directory / notifier ---

#[derive(Default)]
pub struct FakeDirectory {
  customers: Mutex<HashMap<Uuid, Customer>>,
  sellers: Mutex<HashMap<Uuid, Seller>>,
  addresses: Mutex<HashMap<Uuid, Address>>,
}

impl FakeDirectory {
  pub fn add_customer(&self, customer: Customer) {
    self.customers.lock().insert(customer.id, customer);
  }

  pub fn add_seller(&self, seller: Seller) {
    self.sellers.lock().insert(seller.id, seller);
  }

  pub fn add_address(&self, address: Address) {
    self.addresses.lock().insert(address.id, address);
  }

  pub fn remove_seller(&self, id: Uuid) {
    self.sellers.lock().remove(&id);
  }

  pub fn remove_customer(&self, id: Uuid) {
    self.customers.lock().remove(&id);
  }
}

#[async_trait]
impl Directory for FakeDirectory {
  async fn customer(&self, id: Uuid) -> FlowResult<Option<Customer>> {
    Ok(self.customers.lock().get(&id).cloned())
  }

  async fn seller(&self, id: Uuid) -> FlowResult<Option<Seller>> {
    Ok(self.sellers.lock().get(&id).cloned())
  }

  async fn address(&self, id: Uuid) -> FlowResult<Option<Address>> {
    Ok(self.addresses.lock().get(&id).cloned())
  }
}

#[derive(Default)]
pub struct RecordingNotifier {
  sent: Mutex<Vec<Email>>,
}

impl RecordingNotifier {
  pub fn sent(&self) -> Vec<Email> {
    self.sent.lock().clone()
  }

  pub fn sent_to(&self, to: &str) -> Vec<Email> {
    self.sent.lock().iter().filter(|e| e.to == to).cloned().collect()
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn enqueue(&self, email: Email) -> FlowResult<()> {
    self.sent.lock().push(email);
    Ok(())
  }
}

// --- Store faults ---

/// Fails a chosen commit made through the lifecycle. Writes made directly on
/// `World::store` are not counted.
#[derive(Default)]
pub struct CommitFaults {
  fail_at: AtomicUsize,
  seen: AtomicUsize,
}

impl CommitFaults {
  /// Lets `ok` more commits through, then fails the next one once.
  pub fn fail_after(&self, ok: usize) {
    self.seen.store(0, Ordering::SeqCst);
    self.fail_at.store(ok + 1, Ordering::SeqCst);
  }

  fn trip(&self) -> bool {
    let at = self.fail_at.load(Ordering::SeqCst);
    if at == 0 {
      return false;
    }
    let n = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
    if n == at {
      self.fail_at.store(0, Ordering::SeqCst);
      return true;
    }
    false
  }
}

struct FaultyStore {
  inner: Arc<InMemoryOrderStore>,
  faults: Arc<CommitFaults>,
}

#[async_trait]
impl OrderStore for FaultyStore {
  async fn insert(&self, order: &Order, items: &[OrderItem]) -> FlowResult<()> {
    self.inner.insert(order, items).await
  }

  async fn order(&self, id: Uuid) -> FlowResult<Option<Order>> {
    self.inner.order(id).await
  }

  async fn items(&self, order_id: Uuid) -> FlowResult<Vec<OrderItem>> {
    self.inner.items(order_id).await
  }

  async fn find(&self, query: &OrderQuery) -> FlowResult<Vec<Order>> {
    self.inner.find(query).await
  }

  async fn find_by_partner_order_id(&self, partner_order_id: &str) -> FlowResult<Option<Order>> {
    self.inner.find_by_partner_order_id(partner_order_id).await
  }

  async fn find_by_secure_partner_order_id(&self, partner_order_id: &str) -> FlowResult<Option<Order>> {
    self.inner.find_by_secure_partner_order_id(partner_order_id).await
  }

  async fn commit(&self, order: &Order, items: &[OrderItem]) -> FlowResult<Order> {
    if self.faults.trip() {
      return Err(FlowError::store(anyhow::anyhow!("injected commit failure for order {}", order.id)));
    }
    self.inner.commit(order, items).await
  }
}

// --- World ---

pub fn address(owner_id: Uuid, line1: &str) -> Address {
  Address {
    id: Uuid::new_v4(),
    owner_id,
    contact_name: "Front desk".to_string(),
    phone: "98450 12345".to_string(),
    line1: line1.to_string(),
    line2: None,
    landmark: None,
    city: "Bengaluru".to_string(),
    state: "KA".to_string(),
    pincode: "560001".to_string(),
    country: "IN".to_string(),
    lat: 12.97,
    lng: 77.59,
  }
}

/// A seller and a customer registered in the directory, with addresses.
#[derive(Debug, Clone)]
pub struct Parties {
  pub seller: Seller,
  pub customer: Customer,
  pub store_address: Address,
  pub home_address: Address,
}

/// Everything a test needs, wired together. The clock starts at
/// 2026-03-02 06:30 UTC (noon in the default business offset), a Monday.
pub struct World {
  pub lifecycle: OrderLifecycle,
  pub store: Arc<InMemoryOrderStore>,
  pub gateway: Arc<FakeGateway>,
  pub partner: Arc<FakePartner>,
  pub inventory: Arc<FakeInventory>,
  pub cart: Arc<FakeCart>,
  pub directory: Arc<FakeDirectory>,
  pub notifier: Arc<RecordingNotifier>,
  pub clock: Arc<ManualClock>,
  pub commit_faults: Arc<CommitFaults>,
}

impl World {
  pub fn new() -> Self {
    Self::with_config(LifecycleConfig::default())
  }

  pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 6, 30, 0).single().unwrap_or_else(Utc::now)
  }

  pub fn with_config(config: LifecycleConfig) -> Self {
    let store = Arc::new(InMemoryOrderStore::new());
    let gateway = Arc::new(FakeGateway::default());
    let partner = Arc::new(FakePartner::default());
    let inventory = Arc::new(FakeInventory::default());
    let cart = Arc::new(FakeCart::default());
    let directory = Arc::new(FakeDirectory::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::at(Self::start_time()));
    let commit_faults = Arc::new(CommitFaults::default());
    let ports = Collaborators {
      store: Arc::new(FaultyStore {
        inner: store.clone(),
        faults: commit_faults.clone(),
      }),
      gateway: gateway.clone(),
      partner: partner.clone(),
      inventory: inventory.clone(),
      cart: cart.clone(),
      directory: directory.clone(),
      notifier: notifier.clone(),
      clock: clock.clone(),
    };
    World {
      lifecycle: OrderLifecycle::new(ports, config),
      store,
      gateway,
      partner,
      inventory,
      cart,
      directory,
      notifier,
      clock,
      commit_faults,
    }
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  /// Registers a seller (primary contact, Sunday off) and a customer.
  pub fn parties(&self) -> Parties {
    let seller_id = Uuid::new_v4();
    let customer_id = Uuid::new_v4();
    let store_address = address(seller_id, "12 Market Road");
    let home_address = address(customer_id, "4 Lake View");
    let seller = Seller {
      id: seller_id,
      store_name: "Lamp House".to_string(),
      email: "seller@lamphouse.test".to_string(),
      contacts: vec![SellerContact {
        name: "Asha".to_string(),
        phone: "+91 98450 00001".to_string(),
        email: None,
        is_primary: true,
      }],
      weekly_off_days: vec![Weekday::Sun],
      store_address_id: Some(store_address.id),
    };
    let customer = Customer {
      id: customer_id,
      name: "Ravi".to_string(),
      phone: "09845000002".to_string(),
      email: Some("ravi@example.test".to_string()),
    };
    self.directory.add_address(store_address.clone());
    self.directory.add_address(home_address.clone());
    self.directory.add_seller(seller.clone());
    self.directory.add_customer(customer.clone());
    Parties {
      seller,
      customer,
      store_address,
      home_address,
    }
  }

  /// Stores an order between `parties` already at `status`, with one item per
  /// `(product_code, quantity, item_type)`. Items carry the same status.
  pub async fn seed_order(
    &self,
    parties: &Parties,
    code: &str,
    status: OrderStatus,
    lines: &[(&str, i32, ItemType)],
  ) -> (Order, Vec<OrderItem>) {
    let created = self.now() - Duration::days(1);
    let total: Amount = lines.iter().map(|(_, qty, _)| 25_000 * *qty as Amount).sum();
    let mut order = Order::new(code, parties.customer.id, parties.seller.id, total, created);
    order.status = status;
    order.modified_at = created;
    order.delivery_address = Some(parties.home_address.clone());
    let items: Vec<OrderItem> = lines
      .iter()
      .map(|(product_code, qty, item_type)| {
        let product = ProductSnapshot {
          code: product_code.to_string(),
          name: format!("Product {}", product_code),
          unit_price: 25_000,
          seller_id: parties.seller.id,
        };
        let mut item = OrderItem::new(order.id, product, *qty, *item_type, created);
        item.status = status;
        item
      })
      .collect();
    if let Err(e) = self.store.insert(&order, &items).await {
      panic!("seeding order {} failed: {}", code, e);
    }
    (order, items)
  }

  pub async fn order(&self, id: Uuid) -> Order {
    match self.store.order(id).await {
      Ok(Some(order)) => order,
      other => panic!("order {} not readable: {:?}", id, other.map(|o| o.map(|o| o.code))),
    }
  }

  /// Edits a stored order in place, bypassing the authority. Fixture use only.
  pub async fn patch_order(&self, id: Uuid, edit: impl FnOnce(&mut Order)) -> Order {
    let mut order = self.order(id).await;
    edit(&mut order);
    match self.store.commit(&order, &[]).await {
      Ok(committed) => committed,
      Err(e) => panic!("patching order {} failed: {}", id, e),
    }
  }

  pub async fn items(&self, order_id: Uuid) -> Vec<OrderItem> {
    self.store.items(order_id).await.unwrap_or_default()
  }
}

impl Default for World {
  fn default() -> Self {
    Self::new()
  }
}
