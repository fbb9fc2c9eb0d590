//! Message bus — decouples chat channels from the agent runner.

pub mod queue;
pub mod types;

pub use queue::{MessageBus, DEFAULT_BUS_CAPACITY};
pub use types::{InboundMessage, OutboundMessage};
