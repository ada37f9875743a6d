//! Webhook Delivery Pipeline (§4.5, §4.6) and its queue (§3).

pub mod deliveries;
pub mod error;
pub mod events;
pub mod signing;
pub mod subscriptions;
pub mod types;
pub mod worker;
