//! Tool dispatcher: runs one invocation and always yields text.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use clawbot_core::types::{ToolInvocation, ToolResult, TurnContext};
use clawbot_mcp::render_tool_result;

use crate::registry::{ToolRegistry, ToolRoute};
use crate::tools::base::Tool;

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run `name` with `args`. Failures come back as text, never as errors.
    pub async fn execute(&self, name: &str, args: Value, ctx: &TurnContext) -> String {
        match self.registry.route(name) {
            ToolRoute::BuiltIn(tool) | ToolRoute::ChannelAction(tool) => {
                run_handler(tool.as_ref(), &args, ctx).await
            }
            ToolRoute::External { server, tool } => {
                match self.registry.servers().call_tool(&server, &tool, args).await {
                    Ok(result) => render_tool_result(&result),
                    Err(e) => {
                        warn!(server = %server, tool = %tool, "tool call failed: {e}");
                        format!("Tool error: {e}")
                    }
                }
            }
            ToolRoute::Unknown => {
                warn!(tool = %name, "unknown tool requested");
                format!("Unknown tool: {name}")
            }
        }
    }

    pub async fn execute_invocation(&self, invocation: &ToolInvocation, ctx: &TurnContext) -> ToolResult {
        info!(tool = %invocation.name, id = %invocation.id, "executing tool call");
        let content = self
            .execute(&invocation.name, invocation.arguments.clone(), ctx)
            .await;
        ToolResult::new(&invocation.id, content)
    }
}

async fn run_handler(tool: &dyn Tool, args: &Value, ctx: &TurnContext) -> String {
    match tool.execute(args, ctx).await {
        Ok(output) => output,
        Err(e) => {
            warn!(tool = %tool.name(), error = %e, "tool execution failed");
            format!("Error executing {}: {e}", tool.name())
        }
    }
}
