// tests/common/mod.rs
#![allow(dead_code)] // Not every test binary uses every helper

use orderflow::model::{ItemType, Requester};
use orderflow::testkit::{Parties, World};
use orderflow::workflow::{ContextData, Handler, StepControl};
use orderflow::{FlowError, LifecycleConfig, Order, OrderItem, OrderStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::Level;

// --- Tracing (once per test binary) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Fixtures ---

pub struct Scene {
  pub world: World,
  pub parties: Parties,
}

impl Scene {
  pub fn new() -> Self {
    Self::with_config(LifecycleConfig::default())
  }

  pub fn with_config(config: LifecycleConfig) -> Self {
    setup_tracing();
    let world = World::with_config(config);
    let parties = world.parties();
    Scene { world, parties }
  }

  pub fn seller(&self) -> Requester {
    Requester::seller(self.parties.seller.id)
  }

  pub fn customer(&self) -> Requester {
    Requester::customer(self.parties.customer.id)
  }

  pub async fn order(&self, code: &str, status: OrderStatus, lines: &[(&str, i32, ItemType)]) -> (Order, Vec<OrderItem>) {
    self.world.seed_order(&self.parties, code, status, lines).await
  }

  /// One BUY line of two units.
  pub async fn simple_order(&self, code: &str, status: OrderStatus) -> Order {
    self.order(code, status, &[("LAMP-1", 2, ItemType::Buy)]).await.0
  }

  pub async fn history_of(&self, order: &Order) -> Vec<OrderStatus> {
    self.world.order(order.id).await.status_history.iter().map(|e| e.status).collect()
  }
}

pub fn item_statuses(items: &[OrderItem]) -> Vec<OrderStatus> {
  items.iter().map(|i| i.status).collect()
}

// --- Workflow runner helpers ---

#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub counter: i32,
  pub steps_executed: Vec<String>,
  pub should_stop_at: Option<String>,
}

pub static HANDLER_EXEC_COUNTER: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(0));

pub fn reset_counters() {
  HANDLER_EXEC_COUNTER.store(0, Ordering::SeqCst);
}

pub fn create_simple_handler(step_name: &'static str) -> Handler<TestContext, FlowError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      HANDLER_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
      let mut guard = ctx.write();
      guard.counter += 1;
      guard.steps_executed.push(step_name.to_string());
      if guard.should_stop_at.as_deref() == Some(step_name) {
        return Ok(StepControl::Stop);
      }
      Ok(StepControl::Continue)
    })
  })
}

pub fn create_failing_handler(step_name: &'static str, message: &'static str) -> Handler<TestContext, FlowError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().steps_executed.push(step_name.to_string());
      Err(FlowError::Validation(message.to_string()))
    })
  })
}
