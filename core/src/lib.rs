// orderflow/src/lib.rs

//! Orderflow: the order lifecycle engine of a single-seller marketplace.
//!
//! An order moves from payment through the seller's decision, delivery and,
//! optionally, a secure return, along a fixed transition table:
//!  - `TransitionAuthority` is the only writer of order and item statuses.
//!  - Reconcilers fold payment gateway and delivery partner state into orders,
//!    from background sweeps, the status endpoint and the partner webhook.
//!  - Compensation (refund on rejection) runs as a named-step workflow.
//!  - Every external system is a trait in `ports`, so the engine runs the
//!    same against HTTP/SQL adapters and the fakes in `testkit`.

pub mod authority;
pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod payment;
pub mod ports;
pub mod reference;
pub mod refund;
pub mod scheduler;
pub mod secure_return;
pub mod settlement;
pub mod status;
pub mod store;
pub mod workflow;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

// --- Re-exports for the Public API ---

pub use crate::authority::TransitionAuthority;
pub use crate::config::LifecycleConfig;
pub use crate::delivery::DeliveryUpdate;
pub use crate::error::{FlowError, FlowResult, WorkflowError};
pub use crate::lifecycle::{Collaborators, LifecycleContext, OrderLifecycle, SettlementView};
pub use crate::model::{Actor, Amount, Order, OrderItem, Requester, Role};
pub use crate::refund::RefundOutcome;
pub use crate::scheduler::{SweepJob, SweepReport, Sweeper};
pub use crate::secure_return::{AppraisalRequest, SecureReturnRequest};
pub use crate::settlement::{settle, SettlementBreakdown};
pub use crate::status::OrderStatus;
pub use crate::store::{InMemoryOrderStore, OrderQuery, OrderStore};
