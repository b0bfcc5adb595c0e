//! Document relay — request forwarding, delivery reconciliation and billing.

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod reconcile;
pub mod store;
