//! Test doubles shared by this crate's unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use clawbot_core::types::{ContentBlock, ConversationTurn, ModelResponse, StopReason, ToolSchema};
use clawbot_mcp::{ExternalServer, ServerTimeouts};
use clawbot_providers::ModelClient;

/// An in-process tool server over a duplex pipe, already handshaken.
///
/// `tools/call` answers with the `text` argument (or the tool name).
/// Tool `fail` answers with a JSON-RPC error; tool `crash` drops the
/// connection without answering.
pub(crate) async fn fake_server(name: &str, tools: &[&str]) -> ExternalServer {
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client_side);
    let (server_read, mut server_write) = tokio::io::split(server_side);
    let listed: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t,
                "description": format!("fake {t}"),
                "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}
            })
        })
        .collect();

    tokio::spawn(async move {
        let mut lines = BufReader::new(server_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(msg) = serde_json::from_str::<Value>(&line) else { continue };
            let Some(id) = msg.get("id").cloned() else { continue };
            let reply = match msg["method"].as_str().unwrap_or_default() {
                "initialize" => json!({"jsonrpc": "2.0", "id": id, "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "fake", "version": "0.0.1"}
                }}),
                "tools/list" => json!({"jsonrpc": "2.0", "id": id, "result": {"tools": listed}}),
                "tools/call" => match msg["params"]["name"].as_str().unwrap_or_default() {
                    "crash" => break,
                    "fail" => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32000, "message": "boom"}}),
                    tool => {
                        let text = msg["params"]["arguments"]["text"].as_str().unwrap_or(tool);
                        json!({"jsonrpc": "2.0", "id": id, "result": {"content": [{"type": "text", "text": text}]}})
                    }
                },
                _ => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method not found"}}),
            };
            let mut out = reply.to_string();
            out.push('\n');
            if server_write.write_all(out.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let timeouts = ServerTimeouts {
        request: Duration::from_secs(5),
        shutdown_grace: Duration::from_secs(1),
    };
    let mut server = ExternalServer::attach(name, client_read, client_write, timeouts);
    server.handshake().await.unwrap();
    server
}

/// Model stub that replays scripted responses and records what it was sent.
pub(crate) struct ScriptedModel {
    responses: Mutex<VecDeque<ModelResponse>>,
    /// When the script runs out: keep requesting this tool, or answer "done".
    repeat_tool: Option<String>,
    pub calls: Mutex<Vec<(String, Vec<ConversationTurn>, Vec<ToolSchema>)>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat_tool: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A model that asks for `tool` on every call.
    pub fn always_tool(tool: &str) -> Self {
        Self {
            repeat_tool: Some(tool.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

pub(crate) fn tool_use(id: &str, name: &str, input: Value) -> ModelResponse {
    ModelResponse {
        stop_reason: StopReason::ToolUse,
        content: vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }],
        usage: None,
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn call(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        tools: &[ToolSchema],
    ) -> anyhow::Result<ModelResponse> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((system_prompt.to_string(), history.to_vec(), tools.to_vec()));
            calls.len()
        };
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return Ok(next);
        }
        Ok(match &self.repeat_tool {
            Some(tool) => tool_use(&format!("toolu_{n}"), tool, json!({})),
            None => ModelResponse::text("done"),
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn display_name(&self) -> &str {
        "Scripted"
    }
}
