//! Bus event types — messages flowing between chat channels and the agent runner.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::types::TurnContext;

/// A user message arriving from a channel.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Channel name (e.g. "telegram", "cli").
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Channel-specific extras: `username`, `first_name`, `chat_type`, `message_id`.
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        InboundMessage {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Session key, e.g. `"telegram:123456"`.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }

    /// Build the per-turn context handed to the conversation loop.
    pub fn turn_context(&self) -> TurnContext {
        let mut ctx = TurnContext::new(&self.sender_id, &self.chat_id, self.session_key());
        if let Some(name) = self.metadata.get("first_name").filter(|n| !n.is_empty()) {
            ctx = ctx.with_user_name(name);
        }
        if let Some(kind) = self.metadata.get("chat_type").filter(|k| !k.is_empty()) {
            ctx = ctx.with_chat_type(kind);
        }
        ctx
    }
}

/// A reply travelling from the agent back to a channel.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    /// Message id to reply to, if the channel supports threading replies.
    pub reply_to: Option<String>,
}

impl OutboundMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        OutboundMessage {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            reply_to: None,
        }
    }

    /// Reply to the message an inbound came from.
    pub fn reply(inbound: &InboundMessage, content: impl Into<String>) -> Self {
        let mut out = Self::new(&inbound.channel, &inbound.chat_id, content);
        out.reply_to = inbound.metadata.get("message_id").cloned();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key() {
        let msg = InboundMessage::new("telegram", "42", "-100123", "hi");
        assert_eq!(msg.session_key(), "telegram:-100123");
    }

    #[test]
    fn test_turn_context_defaults() {
        let msg = InboundMessage::new("cli", "local", "direct", "hello");
        let ctx = msg.turn_context();
        assert_eq!(ctx.user_id, "local");
        assert_eq!(ctx.chat_id, "direct");
        assert_eq!(ctx.session_id, "cli:direct");
        assert_eq!(ctx.user_name, "User");
        assert_eq!(ctx.chat_type, "private");
    }

    #[test]
    fn test_turn_context_from_metadata() {
        let msg = InboundMessage::new("telegram", "7", "-5", "hey")
            .with_meta("first_name", "Grace")
            .with_meta("chat_type", "supergroup");
        let ctx = msg.turn_context();
        assert_eq!(ctx.user_name, "Grace");
        assert_eq!(ctx.chat_type, "supergroup");
    }

    #[test]
    fn test_reply_threads_message_id() {
        let inbound = InboundMessage::new("telegram", "7", "99", "q").with_meta("message_id", "314");
        let out = OutboundMessage::reply(&inbound, "a");
        assert_eq!(out.channel, "telegram");
        assert_eq!(out.chat_id, "99");
        assert_eq!(out.reply_to.as_deref(), Some("314"));
    }
}
