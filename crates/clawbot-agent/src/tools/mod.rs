//! Tool handlers run in-process.

pub mod actions;
pub mod base;
pub mod handlers;
pub mod knowledge;

pub use actions::{action_tools, ChannelActions, ChatInfo, UserInfo};
pub use base::{optional_id, optional_string, require_id, require_string, Tool};
pub use knowledge::{KnowledgeBase, KnowledgeHit, SearchKnowledgeTool, SessionKnowledgeBase};
