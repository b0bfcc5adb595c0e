//! Outbound dispatch — every transport effect goes through one rate-limited queue.

pub mod profile;
pub mod queue;

pub use profile::{ActionKind, DelayProfile, DelayRange};
pub use queue::{DispatchFuture, DispatchQueue, DispatchStats};
