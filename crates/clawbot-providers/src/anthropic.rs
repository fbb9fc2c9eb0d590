//! Anthropic Messages API client.
//!
//! Content blocks already serialize in the Messages API shape, so the
//! request body is the turn list with roles mapped (`tool_result` turns
//! travel as `user`) and adjacent same-role turns merged.

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use clawbot_core::config::schema::ProviderConfig;
use clawbot_core::types::{
    ContentBlock, ConversationTurn, ModelResponse, Role, StopReason, ToolSchema, Usage,
};

use crate::traits::{ModelClient, ModelRequestConfig};

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolSchema],
}

#[derive(Debug, Serialize, PartialEq)]
struct WireMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    stop_reason: Option<StopReason>,
    #[serde(default)]
    usage: Option<Usage>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "assistant",
        Role::User | Role::ToolResult => "user",
    }
}

/// Map turns to API messages, merging neighbours that share a role.
fn to_wire_messages(history: &[ConversationTurn]) -> Vec<WireMessage> {
    let mut messages: Vec<WireMessage> = Vec::with_capacity(history.len());
    for turn in history {
        if turn.content.is_empty() {
            continue;
        }
        let role = wire_role(turn.role);
        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(turn.content.iter().cloned()),
            _ => messages.push(WireMessage {
                role,
                content: turn.content.clone(),
            }),
        }
    }
    messages
}

/// Keep text and tool_use blocks; skip kinds this client does not model.
fn parse_blocks(raw: Vec<Value>) -> Vec<ContentBlock> {
    raw.into_iter()
        .filter_map(|block| match serde_json::from_value::<ContentBlock>(block.clone()) {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                let kind = block.get("type").cloned().unwrap_or(Value::Null);
                debug!(kind = %kind, "skipping content block");
                None
            }
        })
        .collect()
}

// ─────────────────────────────────────────────
// AnthropicClient
// ─────────────────────────────────────────────

pub struct AnthropicClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    request: ModelRequestConfig,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicClient {
    pub fn new(
        config: &ProviderConfig,
        model: &str,
        request: ModelRequestConfig,
    ) -> anyhow::Result<Self> {
        if !config.is_configured() {
            bail!("No Anthropic API key configured. Set ANTHROPIC_API_KEY or providers.anthropic.apiKey.");
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key: config.api_key.clone(),
            model: model.to_string(),
            request,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn call(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        tools: &[ToolSchema],
    ) -> anyhow::Result<ModelResponse> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.request.max_tokens,
            temperature: self.request.temperature,
            system: system_prompt,
            messages: to_wire_messages(history),
            tools,
        };

        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = tools.len(),
            "Calling model"
        );

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request failed");
                anyhow::anyhow!("Error calling model: {e}")
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(status = %status, body = %error_text, "API error");
            bail!("Error calling model: {status}: {error_text}");
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Error parsing model response")?;

        let stop_reason = parsed.stop_reason.unwrap_or_else(|| {
            warn!("response carried no stop_reason");
            StopReason::EndTurn
        });
        let content = parse_blocks(parsed.content);

        debug!(
            stop_reason = ?stop_reason,
            blocks = content.len(),
            output_tokens = parsed.usage.as_ref().map_or(0, |u| u.output_tokens),
            "Model response received"
        );

        Ok(ModelResponse {
            stop_reason,
            content,
            usage: parsed.usage,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn display_name(&self) -> &str {
        "Anthropic"
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clawbot_core::types::ToolResult;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_client(base: &str) -> AnthropicClient {
        let config = ProviderConfig {
            api_key: "sk-ant-test".to_string(),
            api_base: Some(base.to_string()),
        };
        AnthropicClient::new(&config, "claude-sonnet-4-20250514", ModelRequestConfig::default())
            .unwrap()
    }

    #[test]
    fn test_requires_api_key() {
        let err = AnthropicClient::new(
            &ProviderConfig::default(),
            "claude-sonnet-4-20250514",
            ModelRequestConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_messages_url() {
        assert_eq!(
            make_client("https://api.anthropic.com/").messages_url(),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn test_wire_messages_map_and_merge_roles() {
        let history = vec![
            ConversationTurn::user("earlier question"),
            ConversationTurn::user("list my repos"),
            ConversationTurn::assistant(vec![ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "github_list_repos".into(),
                input: json!({}),
            }]),
            ConversationTurn::tool_results(vec![ToolResult::new("toolu_1", "repo-a")]),
        ];
        let wire = to_wire_messages(&history);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0].role, "user");
        assert_eq!(wire[0].content.len(), 2);
        assert_eq!(wire[1].role, "assistant");
        assert_eq!(wire[2].role, "user");
        let v = serde_json::to_value(&wire[2]).unwrap();
        assert_eq!(v["content"][0]["type"], "tool_result");
        assert_eq!(v["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_parse_blocks_skips_unknown_kinds() {
        let blocks = parse_blocks(vec![
            json!({"type": "thinking", "thinking": "hmm", "signature": "x"}),
            json!({"signature": "no type field"}),
            json!({"type": "text", "text": "Done."}),
        ]);
        assert_eq!(blocks, vec![ContentBlock::text("Done.")]);
    }

    #[tokio::test]
    async fn test_call_text_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({
                "model": "claude-sonnet-4-20250514",
                "max_tokens": 4096,
                "system": "You are helpful.",
                "messages": [{"role": "user", "content": [{"type": "text", "text": "Hello"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "Hi there!"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 12, "output_tokens": 4}
            })))
            .mount(&mock_server)
            .await;

        let client = make_client(&mock_server.uri());
        let resp = client
            .call("You are helpful.", &[ConversationTurn::user("Hello")], &[])
            .await
            .unwrap();

        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert_eq!(resp.text_content().as_deref(), Some("Hi there!"));
        assert_eq!(resp.usage.unwrap().output_tokens, 4);
    }

    #[tokio::test]
    async fn test_call_tool_use_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({
                "tools": [{"name": "search_knowledge_base"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "Let me look."},
                    {"type": "tool_use", "id": "toolu_01", "name": "search_knowledge_base", "input": {"query": "deploy"}}
                ],
                "stop_reason": "tool_use"
            })))
            .mount(&mock_server)
            .await;

        let tools = vec![ToolSchema {
            name: "search_knowledge_base".into(),
            description: "Search past messages".into(),
            input_schema: json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
        }];
        let client = make_client(&mock_server.uri());
        let resp = client
            .call("", &[ConversationTurn::user("what did we say about deploy?")], &tools)
            .await
            .unwrap();

        assert!(resp.wants_tools());
        let calls = resp.tool_invocations();
        assert_eq!(calls[0].id, "toolu_01");
        assert_eq!(calls[0].arguments["query"], "deploy");
    }

    #[tokio::test]
    async fn test_call_api_error_propagates() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_json(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&mock_server)
            .await;

        let client = make_client(&mock_server.uri());
        let err = client
            .call("", &[ConversationTurn::user("hi")], &[])
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Error calling model: 529"));
        assert!(msg.contains("Overloaded"));
        assert!(!msg.contains('—'));
    }

    #[tokio::test]
    async fn test_call_network_error() {
        let client = make_client("http://127.0.0.1:1");
        let err = client
            .call("", &[ConversationTurn::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Error calling model"));
    }
}
