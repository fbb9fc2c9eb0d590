//! Chat-platform actions exposed to the model as tools.
//!
//! The platform adapter implements [`ChannelActions`]; [`action_tools`]
//! wraps it in one handler per action.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use clawbot_core::types::TurnContext;

use super::base::{optional_id, require_id, require_string, Tool};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserInfo {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatInfo {
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
}

/// Operations on the host chat platform.
#[async_trait]
pub trait ChannelActions: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;

    /// `None` when the user is unknown or not visible to the bot.
    async fn get_user_info(&self, user_id: i64) -> anyhow::Result<Option<UserInfo>>;

    async fn get_chat_info(&self, chat_id: i64) -> anyhow::Result<Option<ChatInfo>>;

    async fn get_chat_member_count(&self, chat_id: i64) -> anyhow::Result<u32>;

    async fn get_chat_administrators(&self, chat_id: i64) -> anyhow::Result<Vec<UserInfo>>;

    async fn forward_message(
        &self,
        from_chat_id: i64,
        to_chat_id: i64,
        message_id: i64,
    ) -> anyhow::Result<()>;

    async fn pin_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()>;

    /// Unpin `message_id`, or the most recent pin when `None`.
    async fn unpin_message(&self, chat_id: i64, message_id: Option<i64>) -> anyhow::Result<()>;
}

// ─────────────────────────────────────────────
// Action tools
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    SendMessage,
    GetUserInfo,
    GetChatInfo,
    GetChatMemberCount,
    GetChatAdministrators,
    ForwardMessage,
    PinMessage,
    UnpinMessage,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        ActionKind::SendMessage,
        ActionKind::GetUserInfo,
        ActionKind::GetChatInfo,
        ActionKind::GetChatMemberCount,
        ActionKind::GetChatAdministrators,
        ActionKind::ForwardMessage,
        ActionKind::PinMessage,
        ActionKind::UnpinMessage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::SendMessage => "send_message",
            ActionKind::GetUserInfo => "get_user_info",
            ActionKind::GetChatInfo => "get_chat_info",
            ActionKind::GetChatMemberCount => "get_chat_member_count",
            ActionKind::GetChatAdministrators => "get_chat_administrators",
            ActionKind::ForwardMessage => "forward_message",
            ActionKind::PinMessage => "pin_message",
            ActionKind::UnpinMessage => "unpin_message",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ActionKind::SendMessage => "Send a message to a Telegram chat or user",
            ActionKind::GetUserInfo => "Get information about a Telegram user",
            ActionKind::GetChatInfo => "Get information about a Telegram chat or group",
            ActionKind::GetChatMemberCount => {
                "Get the number of members in a Telegram group or channel"
            }
            ActionKind::GetChatAdministrators => "Get the list of administrators in a Telegram group",
            ActionKind::ForwardMessage => "Forward a message from one chat to another",
            ActionKind::PinMessage => "Pin a message in a Telegram chat",
            ActionKind::UnpinMessage => "Unpin a message in a Telegram chat",
        }
    }

    fn parameters(self) -> Value {
        let id = |description: &str| json!({"type": "integer", "description": description});
        match self {
            ActionKind::SendMessage => json!({
                "type": "object",
                "properties": {
                    "chat_id": id("The chat ID to send the message to"),
                    "text": {"type": "string", "description": "The message text to send"}
                },
                "required": ["chat_id", "text"]
            }),
            ActionKind::GetUserInfo => json!({
                "type": "object",
                "properties": {"user_id": id("The user ID to get info for")},
                "required": ["user_id"]
            }),
            ActionKind::GetChatInfo => json!({
                "type": "object",
                "properties": {"chat_id": id("The chat ID to get info for")},
                "required": ["chat_id"]
            }),
            ActionKind::GetChatMemberCount => json!({
                "type": "object",
                "properties": {"chat_id": id("The chat ID to count members for")},
                "required": ["chat_id"]
            }),
            ActionKind::GetChatAdministrators => json!({
                "type": "object",
                "properties": {"chat_id": id("The chat ID to get admins for")},
                "required": ["chat_id"]
            }),
            ActionKind::ForwardMessage => json!({
                "type": "object",
                "properties": {
                    "from_chat_id": id("The source chat ID"),
                    "to_chat_id": id("The target chat ID"),
                    "message_id": id("The message ID to forward")
                },
                "required": ["from_chat_id", "to_chat_id", "message_id"]
            }),
            ActionKind::PinMessage => json!({
                "type": "object",
                "properties": {
                    "chat_id": id("The chat ID"),
                    "message_id": id("The message ID to pin")
                },
                "required": ["chat_id", "message_id"]
            }),
            ActionKind::UnpinMessage => json!({
                "type": "object",
                "properties": {
                    "chat_id": id("The chat ID"),
                    "message_id": id("The message ID to unpin (optional, unpins most recent if not provided)")
                },
                "required": ["chat_id"]
            }),
        }
    }
}

fn or_na(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("N/A")
}

/// One platform action as a tool.
pub struct ActionTool {
    kind: ActionKind,
    actions: Arc<dyn ChannelActions>,
}

impl ActionTool {
    pub fn new(kind: ActionKind, actions: Arc<dyn ChannelActions>) -> Self {
        Self { kind, actions }
    }

    async fn run(&self, args: &Value) -> anyhow::Result<String> {
        let actions = &self.actions;
        match self.kind {
            ActionKind::SendMessage => {
                let chat_id = require_id(args, "chat_id")?;
                let text = require_string(args, "text")?;
                actions.send_message(chat_id, &text).await?;
                Ok(format!("Message sent to chat {chat_id}"))
            }
            ActionKind::GetUserInfo => {
                let user_id = require_id(args, "user_id")?;
                Ok(match actions.get_user_info(user_id).await? {
                    Some(user) => format!(
                        "User Info:\n- ID: {}\n- Username: @{}\n- Name: {} {}",
                        user.id,
                        or_na(&user.username),
                        user.first_name,
                        user.last_name.as_deref().unwrap_or("")
                    )
                    .trim_end()
                    .to_string(),
                    None => "User not found or not accessible".to_string(),
                })
            }
            ActionKind::GetChatInfo => {
                let chat_id = require_id(args, "chat_id")?;
                Ok(match actions.get_chat_info(chat_id).await? {
                    Some(chat) => format!(
                        "Chat Info:\n- ID: {}\n- Type: {}\n- Title: {}\n- Username: @{}",
                        chat.id,
                        chat.kind,
                        or_na(&chat.title),
                        or_na(&chat.username)
                    ),
                    None => "Chat not found or not accessible".to_string(),
                })
            }
            ActionKind::GetChatMemberCount => {
                let chat_id = require_id(args, "chat_id")?;
                let count = actions.get_chat_member_count(chat_id).await?;
                Ok(format!("Chat {chat_id} has {count} members"))
            }
            ActionKind::GetChatAdministrators => {
                let chat_id = require_id(args, "chat_id")?;
                let admins = actions.get_chat_administrators(chat_id).await?;
                if admins.is_empty() {
                    return Ok("No administrators found or not accessible".to_string());
                }
                let lines: Vec<String> = admins
                    .iter()
                    .map(|a| format!("- {} (@{})", a.first_name, or_na(&a.username)))
                    .collect();
                Ok(format!("Administrators ({}):\n{}", admins.len(), lines.join("\n")))
            }
            ActionKind::ForwardMessage => {
                let from = require_id(args, "from_chat_id")?;
                let to = require_id(args, "to_chat_id")?;
                let message_id = require_id(args, "message_id")?;
                actions.forward_message(from, to, message_id).await?;
                Ok(format!("Message forwarded to chat {to}"))
            }
            ActionKind::PinMessage => {
                let chat_id = require_id(args, "chat_id")?;
                let message_id = require_id(args, "message_id")?;
                actions.pin_message(chat_id, message_id).await?;
                Ok(format!("Message {message_id} pinned"))
            }
            ActionKind::UnpinMessage => {
                let chat_id = require_id(args, "chat_id")?;
                let message_id = optional_id(args, "message_id")?;
                actions.unpin_message(chat_id, message_id).await?;
                Ok("Message unpinned".to_string())
            }
        }
    }
}

#[async_trait]
impl Tool for ActionTool {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn description(&self) -> &str {
        self.kind.description()
    }

    fn parameters(&self) -> Value {
        self.kind.parameters()
    }

    async fn execute(&self, args: &Value, _ctx: &TurnContext) -> anyhow::Result<String> {
        self.run(args).await
    }
}

/// Every action, backed by `actions`.
pub fn action_tools(actions: Arc<dyn ChannelActions>) -> Vec<Arc<dyn Tool>> {
    ActionKind::ALL
        .iter()
        .map(|&kind| Arc::new(ActionTool::new(kind, actions.clone())) as Arc<dyn Tool>)
        .collect()
}
