//! Inbound message loop.
//!
//! Pulls messages off the bus and hands each to a worker task for its
//! session. Different sessions run their turns concurrently; turns of one
//! session run in arrival order. Each turn goes through the
//! [`ConversationLoop`] with the session's recent history, then the
//! exchange is persisted and the reply published.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use clawbot_core::bus::{InboundMessage, MessageBus, OutboundMessage};
use clawbot_core::session::SessionManager;
use clawbot_core::types::ConversationTurn;
use clawbot_core::utils::truncate_string;

use crate::agent_loop::{ConversationLoop, TurnOutcome};
use crate::memory::{submit_exchange, MemoryService};

pub const ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

/// Default number of stored turns replayed to the model.
pub const DEFAULT_MAX_HISTORY: usize = 20;

pub struct AgentRunner {
    bus: Arc<MessageBus>,
    sessions: Arc<SessionManager>,
    conversation: Arc<ConversationLoop>,
    memory: Option<Arc<dyn MemoryService>>,
    max_history: usize,
}

impl AgentRunner {
    pub fn new(bus: Arc<MessageBus>, sessions: Arc<SessionManager>, conversation: Arc<ConversationLoop>) -> Self {
        Self {
            bus,
            sessions,
            conversation,
            memory: None,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn conversation(&self) -> &Arc<ConversationLoop> {
        &self.conversation
    }

    /// Consume inbound messages until the bus closes.
    pub async fn run(self: Arc<Self>) {
        info!("agent runner started, waiting for messages");
        let mut workers: HashMap<String, mpsc::UnboundedSender<InboundMessage>> = HashMap::new();
        while let Some(msg) = self.bus.consume_inbound().await {
            let key = msg.session_key();
            let msg = match workers.get(&key) {
                Some(worker) => match worker.send(msg) {
                    Ok(()) => continue,
                    Err(mpsc::error::SendError(msg)) => msg,
                },
                None => msg,
            };
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(msg);
            tokio::spawn(Arc::clone(&self).session_worker(key.clone(), rx));
            workers.insert(key, tx);
        }
        info!("inbound queue closed, agent runner stopping");
    }

    async fn session_worker(self: Arc<Self>, key: String, mut queue: mpsc::UnboundedReceiver<InboundMessage>) {
        debug!(session = %key, "session worker started");
        while let Some(msg) = queue.recv().await {
            self.respond(&msg).await;
        }
        debug!(session = %key, "session worker stopped");
    }

    async fn respond(&self, msg: &InboundMessage) {
        let reply = match self.process(msg).await {
            Ok(outcome) => outcome.final_text,
            Err(e) => {
                error!(error = %e, session = %msg.session_key(), "message processing error");
                ERROR_REPLY.to_string()
            }
        };
        if let Err(e) = self.bus.publish_outbound(OutboundMessage::reply(msg, reply)).await {
            error!(error = %e, "failed to publish outbound message");
        }
    }

    /// Run one message through the loop and record the exchange.
    pub async fn process(&self, msg: &InboundMessage) -> Result<TurnOutcome> {
        let key = msg.session_key();
        let ctx = msg.turn_context();
        info!(
            channel = %msg.channel,
            sender = %msg.sender_id,
            preview = %truncate_string(&msg.content, 80),
            "processing message"
        );

        let history = self.sessions.history(&key, self.max_history);
        let outcome = self.conversation.process_turn(&msg.content, &ctx, history).await?;

        self.sessions.append(&key, ConversationTurn::user(&msg.content));
        self.sessions
            .append(&key, ConversationTurn::assistant_text(&outcome.final_text));

        if let Some(memory) = &self.memory {
            submit_exchange(
                memory.clone(),
                ctx.user_id.clone(),
                msg.content.clone(),
                outcome.final_text.clone(),
            );
        }
        Ok(outcome)
    }

    /// One-shot processing for the CLI.
    pub async fn process_direct(&self, text: &str) -> Result<String> {
        let msg = InboundMessage::new("cli", "user", "direct", text);
        Ok(self.process(&msg).await?.final_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PromptBuilder;
    use crate::dispatcher::ToolDispatcher;
    use crate::registry::ToolRegistry;
    use crate::testing::ScriptedModel;
    use async_trait::async_trait;
    use clawbot_core::types::{ModelResponse, ToolSchema};
    use clawbot_mcp::ToolServers;
    use clawbot_providers::ModelClient;
    use std::sync::Mutex;

    fn runner_with(model: Arc<dyn ModelClient>) -> (tempfile::TempDir, Arc<MessageBus>, AgentRunner) {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionManager::new(Some(dir.path().to_path_buf())).unwrap());
        let bus = Arc::new(MessageBus::new(8));
        let registry = ToolRegistry::new(Arc::new(ToolServers::empty()));
        let conversation = ConversationLoop::new(
            model,
            ToolDispatcher::new(Arc::new(registry)),
            PromptBuilder::new("Persona."),
        );
        let runner = AgentRunner::new(bus.clone(), sessions, Arc::new(conversation));
        (dir, bus, runner)
    }

    #[derive(Default)]
    struct RecordingMemory {
        exchanges: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl MemoryService for RecordingMemory {
        async fn search(&self, _: &str, _: &str, _: usize) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn add_exchange(&self, user: &str, text: &str, reply: &str) -> anyhow::Result<()> {
            self.exchanges
                .lock()
                .unwrap()
                .push((user.into(), text.into(), reply.into()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_process_direct_persists_exchange() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::text("Hello from clawbot!"),
            ModelResponse::text("Still here."),
        ]));
        let (_dir, _bus, runner) = runner_with(model.clone());

        assert_eq!(runner.process_direct("Hi").await.unwrap(), "Hello from clawbot!");
        assert_eq!(runner.process_direct("Again").await.unwrap(), "Still here.");

        let history = runner.sessions.history("cli:direct", 10);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].text().as_deref(), Some("Hi"));
        assert_eq!(history[1].text().as_deref(), Some("Hello from clawbot!"));

        // The second call saw the first exchange plus its own message.
        let calls = model.calls.lock().unwrap();
        assert_eq!(calls[1].1.len(), 3);
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let model = Arc::new(ScriptedModel::new(Vec::new()));
        let (_dir, _bus, runner) = runner_with(model.clone());
        let runner = runner.with_max_history(2);
        for i in 0..3 {
            runner.process_direct(&format!("message {i}")).await.unwrap();
        }
        let calls = model.calls.lock().unwrap();
        // two replayed turns plus the new user turn
        assert_eq!(calls[2].1.len(), 3);
    }

    #[tokio::test]
    async fn test_memory_receives_exchange() {
        let model = Arc::new(ScriptedModel::new(vec![ModelResponse::text("Noted.")]));
        let (_dir, _bus, runner) = runner_with(model);
        let memory = Arc::new(RecordingMemory::default());
        let runner = runner.with_memory(memory.clone());

        runner.process_direct("I live in Lisbon").await.unwrap();
        for _ in 0..50 {
            if !memory.exchanges.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(
            memory.exchanges.lock().unwrap().as_slice(),
            &[("user".to_string(), "I live in Lisbon".to_string(), "Noted.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_run_replies_and_reports_errors() {
        struct Flaky(Mutex<u32>);

        #[async_trait]
        impl ModelClient for Flaky {
            async fn call(&self, _: &str, _: &[ConversationTurn], _: &[ToolSchema]) -> Result<ModelResponse> {
                let mut n = self.0.lock().unwrap();
                *n += 1;
                if *n == 1 {
                    anyhow::bail!("Error calling model: 529 overloaded")
                }
                Ok(ModelResponse::text("Back online."))
            }
            fn model(&self) -> &str {
                "flaky"
            }
            fn display_name(&self) -> &str {
                "Flaky"
            }
        }

        let (_dir, bus, runner) = runner_with(Arc::new(Flaky(Mutex::new(0))));
        let runner = Arc::new(runner);
        let handle = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run().await }
        });

        bus.publish_inbound(InboundMessage::new("telegram", "7", "99", "first").with_meta("message_id", "11"))
            .await
            .unwrap();
        bus.publish_inbound(InboundMessage::new("telegram", "7", "99", "second"))
            .await
            .unwrap();

        let first = bus.consume_outbound().await.unwrap();
        assert_eq!(first.content, ERROR_REPLY);
        assert_eq!(first.reply_to.as_deref(), Some("11"));
        let second = bus.consume_outbound().await.unwrap();
        assert_eq!(second.content, "Back online.");
        assert_eq!(second.chat_id, "99");

        // A failed turn leaves no trace in the session.
        assert_eq!(runner.sessions.history("telegram:99", 10).len(), 2);
        handle.abort();
    }

    #[tokio::test]
    async fn test_sessions_run_concurrently() {
        // Holds the "slow" turn until another turn has reached the model.
        #[derive(Default)]
        struct Gate(tokio::sync::Notify);

        #[async_trait]
        impl ModelClient for Gate {
            async fn call(&self, _: &str, history: &[ConversationTurn], _: &[ToolSchema]) -> Result<ModelResponse> {
                let text = history.last().and_then(|t| t.text()).unwrap_or_default();
                if text == "slow" {
                    self.0.notified().await;
                    Ok(ModelResponse::text("slow done"))
                } else {
                    self.0.notify_one();
                    Ok(ModelResponse::text("fast done"))
                }
            }
            fn model(&self) -> &str {
                "gate"
            }
            fn display_name(&self) -> &str {
                "Gate"
            }
        }

        let (_dir, bus, runner) = runner_with(Arc::new(Gate::default()));
        let handle = tokio::spawn(Arc::new(runner).run());

        bus.publish_inbound(InboundMessage::new("telegram", "1", "100", "slow"))
            .await
            .unwrap();
        bus.publish_inbound(InboundMessage::new("telegram", "2", "200", "fast"))
            .await
            .unwrap();

        let within = std::time::Duration::from_secs(5);
        let first = tokio::time::timeout(within, bus.consume_outbound()).await.unwrap().unwrap();
        assert_eq!((first.chat_id.as_str(), first.content.as_str()), ("200", "fast done"));
        let second = tokio::time::timeout(within, bus.consume_outbound()).await.unwrap().unwrap();
        assert_eq!((second.chat_id.as_str(), second.content.as_str()), ("100", "slow done"));
        handle.abort();
    }
}
