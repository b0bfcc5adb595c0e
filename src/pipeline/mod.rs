//! Relay pipeline.
//!
//! Every inbound event goes through [`Relay::handle_event`]:
//! 1. quoted replies are threaded back through the message index
//! 2. destination messages become notices or document deliveries
//! 3. requester messages go through intake and are queued for forwarding
//!
//! Outbound effects only ever leave through the dispatch queue.

pub mod delivery;
pub mod intake;
pub mod notice;
pub mod relay;
pub mod threading;
pub mod types;

pub use relay::Relay;
pub use types::{Document, InboundEvent, InboundMessage, Outcome, ReactionEvent};
