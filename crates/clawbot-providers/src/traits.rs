//! Model-call trait — the contract the conversation loop depends on.

use async_trait::async_trait;
use clawbot_core::types::{ConversationTurn, ModelResponse, ToolSchema};

/// Sampling settings sent with every call.
#[derive(Clone, Debug)]
pub struct ModelRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for ModelRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// A language model that can be offered tools.
///
/// Errors mean the model could not be reached or answered unusably; the
/// conversation loop propagates them to its caller.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// One model call.
    ///
    /// * `system_prompt` — persona plus any injected context.
    /// * `history` — prior turns, oldest first, ending with the newest user
    ///   or tool-result turn.
    /// * `tools` — schemas the model may invoke; may be empty.
    async fn call(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        tools: &[ToolSchema],
    ) -> anyhow::Result<ModelResponse>;

    /// Model identifier in use.
    fn model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
