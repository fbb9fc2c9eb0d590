//! Core types for Clawbot — conversation turns, content blocks, and tool descriptors.
//!
//! Turns follow a content-block model: a turn carries an ordered list of
//! text, tool-use, and tool-result blocks. The model client serializes these
//! for whichever API it talks to; the rest of the system never sees wire JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ─────────────────────────────────────────────
// Conversation turns
// ─────────────────────────────────────────────

/// Who produced a turn.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Synthetic turn carrying the results of the tools the model asked for.
    ToolResult,
}

/// One block of turn content.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// A role-tagged unit of conversation content.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    /// When the turn was recorded (set on persisted turns).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConversationTurn {
    /// A user turn with plain text.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
            timestamp: None,
        }
    }

    /// An assistant turn with plain text.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::text(text)],
            timestamp: None,
        }
    }

    /// An assistant turn echoing the model's raw content blocks.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            timestamp: None,
        }
    }

    /// One synthetic turn holding every tool result of a round.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::ToolResult,
            content: results
                .into_iter()
                .map(|r| ContentBlock::ToolResult {
                    tool_use_id: r.invocation_id,
                    content: r.content,
                })
                .collect(),
            timestamp: None,
        }
    }

    /// Stamp the turn with the current time.
    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(Utc::now());
        self
    }

    /// Concatenation of all text blocks, or `None` if there are none.
    pub fn text(&self) -> Option<String> {
        collect_text(&self.content)
    }
}

fn collect_text(blocks: &[ContentBlock]) -> Option<String> {
    let mut out = String::new();
    let mut found = false;
    for block in blocks {
        if let ContentBlock::Text { text } = block {
            out.push_str(text);
            found = true;
        }
    }
    found.then_some(out)
}

// ─────────────────────────────────────────────
// Tool invocations and results
// ─────────────────────────────────────────────

/// A tool call requested by the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    /// Correlation id echoed back in the matching result block.
    pub id: String,
    /// Namespaced tool name.
    pub name: String,
    pub arguments: Value,
}

/// The normalized text outcome of one invocation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub invocation_id: String,
    pub content: String,
}

impl ToolResult {
    pub fn new(invocation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────
// Tool descriptors
// ─────────────────────────────────────────────

/// Where a tool comes from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOrigin {
    BuiltIn,
    ChannelAction,
    External { server: String },
}

/// A tool as offered to the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    /// `"{server}_{original}"` for external tools, bare name otherwise.
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub origin: ToolOrigin,
}

impl ToolDescriptor {
    /// The schema shape exposed to the model-call collaborator.
    pub fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

/// `{name, description, input_schema}` as sent to the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Empty object schema used when a tool publishes none.
pub fn empty_input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

// ─────────────────────────────────────────────
// Model responses
// ─────────────────────────────────────────────

/// Why the model stopped generating.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Other,
}

/// Token accounting reported by the model API.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// One model call's result.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelResponse {
    pub stop_reason: StopReason,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ModelResponse {
    /// A plain-text response that ends the turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            stop_reason: StopReason::EndTurn,
            content: vec![ContentBlock::text(text)],
            usage: None,
        }
    }

    /// True when the model stopped to call tools and named at least one.
    pub fn wants_tools(&self) -> bool {
        self.stop_reason == StopReason::ToolUse && !self.tool_invocations().is_empty()
    }

    /// Every tool-use block, in order.
    pub fn tool_invocations(&self) -> Vec<ToolInvocation> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolInvocation {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text blocks, if any.
    pub fn text_content(&self) -> Option<String> {
        collect_text(&self.content)
    }
}

// ─────────────────────────────────────────────
// Turn context
// ─────────────────────────────────────────────

/// Who is talking, and where.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TurnContext {
    pub user_id: String,
    pub chat_id: String,
    pub session_id: String,
    pub user_name: String,
    pub chat_type: String,
}

impl TurnContext {
    pub fn new(
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            session_id: session_id.into(),
            user_name: "User".to_string(),
            chat_type: "private".to_string(),
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = name.into();
        self
    }

    pub fn with_chat_type(mut self, chat_type: impl Into<String>) -> Self {
        self.chat_type = chat_type.into();
        self
    }
}

// ─────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────

/// A conversation session: persisted user messages and final answers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub turns: Vec<ConversationTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    pub fn add_turn(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }

    /// The last `max` turns, oldest first.
    pub fn history(&self, max: usize) -> Vec<ConversationTurn> {
        let start = self.turns.len().saturating_sub(max);
        self.turns[start..].to_vec()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.updated_at = Utc::now();
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_block_serialization() {
        let block = ContentBlock::ToolUse {
            id: "toolu_1".into(),
            name: "github_list_repos".into(),
            input: json!({"owner": "me"}),
        };
        let v = serde_json::to_value(&block).unwrap();
        assert_eq!(v["type"], "tool_use");
        assert_eq!(v["name"], "github_list_repos");
        assert_eq!(v["input"]["owner"], "me");
    }

    #[test]
    fn test_tool_results_turn() {
        let turn = ConversationTurn::tool_results(vec![
            ToolResult::new("a", "first"),
            ToolResult::new("b", "second"),
        ]);
        assert_eq!(turn.role, Role::ToolResult);
        assert_eq!(turn.content.len(), 2);
        match &turn.content[1] {
            ContentBlock::ToolResult { tool_use_id, content } => {
                assert_eq!(tool_use_id, "b");
                assert_eq!(content, "second");
            }
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[test]
    fn test_turn_text_concatenates_blocks() {
        let turn = ConversationTurn::assistant(vec![
            ContentBlock::text("Hello, "),
            ContentBlock::ToolUse {
                id: "x".into(),
                name: "t".into(),
                input: json!({}),
            },
            ContentBlock::text("world"),
        ]);
        assert_eq!(turn.text().as_deref(), Some("Hello, world"));
    }

    #[test]
    fn test_turn_text_none_without_text_blocks() {
        let turn = ConversationTurn::tool_results(vec![ToolResult::new("a", "x")]);
        assert!(turn.text().is_none());
    }

    #[test]
    fn test_stop_reason_deserialize() {
        let r: StopReason = serde_json::from_value(json!("tool_use")).unwrap();
        assert_eq!(r, StopReason::ToolUse);
        let r: StopReason = serde_json::from_value(json!("pause_turn")).unwrap();
        assert_eq!(r, StopReason::Other);
    }

    #[test]
    fn test_model_response_wants_tools() {
        let resp = ModelResponse {
            stop_reason: StopReason::ToolUse,
            content: vec![
                ContentBlock::text("Let me check."),
                ContentBlock::ToolUse {
                    id: "toolu_9".into(),
                    name: "search_knowledge_base".into(),
                    input: json!({"query": "rust"}),
                },
            ],
            usage: None,
        };
        assert!(resp.wants_tools());
        let calls = resp.tool_invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "toolu_9");
        assert_eq!(calls[0].arguments["query"], "rust");
    }

    #[test]
    fn test_tool_use_stop_without_blocks_is_final() {
        let resp = ModelResponse {
            stop_reason: StopReason::ToolUse,
            content: vec![ContentBlock::text("nothing to call")],
            usage: None,
        };
        assert!(!resp.wants_tools());
    }

    #[test]
    fn test_descriptor_to_schema() {
        let desc = ToolDescriptor {
            name: "notion_search".into(),
            description: "Search pages".into(),
            input_schema: empty_input_schema(),
            origin: ToolOrigin::External {
                server: "notion".into(),
            },
        };
        let schema = serde_json::to_value(desc.to_schema()).unwrap();
        assert_eq!(schema["name"], "notion_search");
        assert_eq!(schema["input_schema"]["type"], "object");
        assert!(schema.get("origin").is_none());
    }

    #[test]
    fn test_turn_context_defaults() {
        let ctx = TurnContext::new("1", "2", "telegram:2");
        assert_eq!(ctx.user_name, "User");
        assert_eq!(ctx.chat_type, "private");
        let ctx = ctx.with_user_name("Ada").with_chat_type("group");
        assert_eq!(ctx.user_name, "Ada");
        assert_eq!(ctx.chat_type, "group");
    }

    #[test]
    fn test_session_history_window() {
        let mut session = Session::new("cli:direct");
        for i in 0..5 {
            session.add_turn(ConversationTurn::user(format!("msg {i}")));
        }
        let history = session.history(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text().as_deref(), Some("msg 3"));
        assert_eq!(session.history(50).len(), 5);
        session.clear();
        assert!(session.turns.is_empty());
    }
}
