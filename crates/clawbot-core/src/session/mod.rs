//! Session store — per-chat conversation history persisted as JSONL.

pub mod manager;

pub use manager::{SessionManager, SessionSummary};
