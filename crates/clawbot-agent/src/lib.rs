//! Clawbot agent — conversation loop, tool namespace, and dispatch.
//!
//! - **registry**: one tool namespace over built-ins, channel actions and tool servers
//! - **dispatcher**: runs a resolved tool call and turns every failure into text
//! - **agent_loop**: the model ↔ tool cycle for a single user turn
//! - **context**: system prompt construction
//! - **runner**: inbound bus messages → turns → outbound replies

pub mod agent_loop;
pub mod context;
pub mod dispatcher;
pub mod memory;
pub mod registry;
pub mod runner;
pub mod tools;

#[cfg(test)]
mod testing;

pub use agent_loop::{ConversationLoop, TurnOutcome};
pub use context::PromptBuilder;
pub use dispatcher::ToolDispatcher;
pub use memory::{FileMemory, MemoryService};
pub use registry::{ToolRegistry, ToolRoute};
pub use runner::AgentRunner;
pub use tools::{ChannelActions, KnowledgeBase, Tool};
