// orderflow_server/src/state.rs
use orderflow::OrderLifecycle;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub lifecycle: Arc<OrderLifecycle>,
  pub webhook_secret: Arc<str>,
}
