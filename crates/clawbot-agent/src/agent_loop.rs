//! Conversation loop — the model ↔ tool cycle for one user turn.
//!
//! ```text
//! AwaitingModel ──(tool_use)──▶ ExecutingTools ──▶ AwaitingModel
//!       │
//!       └──(anything else / round limit)──▶ Finalized
//! ```
//!
//! Tool failures become result text the model can react to. Only a failed
//! model call is returned as an error.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use clawbot_core::types::{
    ConversationTurn, ModelResponse, ToolDescriptor, ToolInvocation, ToolSchema, TurnContext,
};
use clawbot_providers::ModelClient;

use crate::context::PromptBuilder;
use crate::dispatcher::ToolDispatcher;

/// Default cap on model calls per turn.
pub const DEFAULT_MAX_ROUNDS: usize = 10;

pub const FALLBACK_REPLY: &str = "I encountered an error processing your request.";
pub const ROUND_LIMIT_REPLY: &str = "I could not complete this within the allowed steps.";

/// What one processed turn produced.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub final_text: String,
    /// Every tool invocation made during the turn, in order.
    pub invocations: Vec<ToolInvocation>,
    pub memories_used: usize,
    pub knowledge_hits: usize,
    /// Model calls made.
    pub rounds: usize,
}

enum LoopState {
    AwaitingModel,
    ExecutingTools(ModelResponse),
    Finalized(String),
}

pub struct ConversationLoop {
    model: Arc<dyn ModelClient>,
    dispatcher: ToolDispatcher,
    prompt: PromptBuilder,
    max_rounds: usize,
}

impl ConversationLoop {
    pub fn new(model: Arc<dyn ModelClient>, dispatcher: ToolDispatcher, prompt: PromptBuilder) -> Self {
        Self {
            model,
            dispatcher,
            prompt,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Cap on model calls per turn (at least one).
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn model(&self) -> &dyn ModelClient {
        self.model.as_ref()
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// The tools currently offered to the model.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.dispatcher.registry().aggregate()
    }

    /// Answer `user_text` given the prior `history` of this conversation.
    pub async fn process_turn(
        &self,
        user_text: &str,
        ctx: &TurnContext,
        history: Vec<ConversationTurn>,
    ) -> Result<TurnOutcome> {
        let prompt = self.prompt.build(user_text, ctx).await;

        let mut turns = history;
        turns.push(ConversationTurn::user(user_text));
        let mut invocations = Vec::new();
        let mut rounds = 0;

        info!(
            session = %ctx.session_id,
            model = %self.model.model(),
            "processing turn"
        );

        let mut state = LoopState::AwaitingModel;
        let final_text = loop {
            state = match state {
                LoopState::AwaitingModel => {
                    rounds += 1;
                    // Rebuilt every round: a server that died mid-turn drops out.
                    let tools: Vec<ToolSchema> = self.list_tools().iter().map(ToolDescriptor::to_schema).collect();
                    debug!(round = rounds, tools = tools.len(), "calling model");
                    let response = self.model.call(&prompt.system, &turns, &tools).await?;

                    if !response.wants_tools() {
                        let text = response.text_content().filter(|t| !t.trim().is_empty());
                        LoopState::Finalized(text.unwrap_or_else(|| FALLBACK_REPLY.to_string()))
                    } else if rounds >= self.max_rounds {
                        warn!(rounds, session = %ctx.session_id, "round limit reached with tools still requested");
                        LoopState::Finalized(ROUND_LIMIT_REPLY.to_string())
                    } else {
                        LoopState::ExecutingTools(response)
                    }
                }
                LoopState::ExecutingTools(response) => {
                    let requested = response.tool_invocations();
                    turns.push(ConversationTurn::assistant(response.content));

                    let mut results = Vec::with_capacity(requested.len());
                    for invocation in requested {
                        let result = self.dispatcher.execute_invocation(&invocation, ctx).await;
                        debug!(tool = %invocation.name, result_len = result.content.len(), "tool result");
                        results.push(result);
                        invocations.push(invocation);
                    }
                    turns.push(ConversationTurn::tool_results(results));
                    LoopState::AwaitingModel
                }
                LoopState::Finalized(text) => break text,
            };
        };

        info!(
            session = %ctx.session_id,
            rounds,
            tool_calls = invocations.len(),
            "turn finalized"
        );

        Ok(TurnOutcome {
            final_text,
            invocations,
            memories_used: prompt.memories_used,
            knowledge_hits: prompt.knowledge_hits,
            rounds,
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
