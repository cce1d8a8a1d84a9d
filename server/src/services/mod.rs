// orderflow_server/src/services/mod.rs

//! Outbound adapters for the lifecycle's provider ports.

pub mod delivery_partner;
pub mod notifier;
pub mod payment_gateway;

pub use delivery_partner::HttpDeliveryPartner;
pub use notifier::LogNotifier;
pub use payment_gateway::HttpPaymentGateway;
