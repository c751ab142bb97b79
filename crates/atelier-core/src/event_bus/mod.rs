//! Event Bus - inter-module message delivery with an audit trail
//!
//! Primary path is Redis pub/sub on per-module channels; when the broker
//! has no listener (or is down) delivery falls back to one direct HTTP
//! call per target. Every transmission, both directions, lands in the
//! append-only `events` table.

pub mod bus;
pub mod handlers;
pub mod listener;
pub mod types;

pub use bus::{BusConfig, EventBus, EventHandler, EventPublisher, ModuleEndpoints};
pub use handlers::{ApprovalDecidedHandler, ValidationResponseHandler};
pub use types::{
    DeliveryStatus, Direction, EventEnvelope, EventRecord, InboundEvent, Module, OutboundEvent,
    CHANNEL_PREFIX, SOURCE_MODULE,
};

#[cfg(test)]
mod tests;
