//! System prompt construction.
//!
//! The prompt is the assistant persona, then what memory recalls about the
//! user, then relevant chat history when the message looks like a recall
//! question. Retrieval failures are logged and leave their section out.

use std::sync::Arc;

use tracing::{error, info};

use clawbot_core::types::TurnContext;

use crate::memory::MemoryService;
use crate::tools::knowledge::{KnowledgeBase, KnowledgeHit};

pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant integrated into Telegram.

## CAPABILITIES:
- Answer questions and have conversations
- Search knowledge base for relevant context (when RAG is enabled)
- Remember user preferences across sessions (when Memory is enabled)
- Use external tools like GitHub and Notion (when tool servers are configured)
- Manage Telegram operations (send messages, get user/chat info, etc.)

## TELEGRAM TOOLS:
You have access to Telegram-specific tools:
- `send_message` - Send messages to any chat
- `get_user_info` - Get information about a user
- `get_chat_info` - Get information about a chat/group
- `get_chat_member_count` - Count members in a group
- `get_chat_administrators` - List group admins
- `forward_message` - Forward messages between chats
- `pin_message` / `unpin_message` - Pin/unpin messages

## EXTERNAL TOOLS:

### GitHub Rules (ALWAYS FOLLOW):
- User mentions \"repos\", \"repositories\", \"GitHub\", \"issues\", \"PR\", \"code\" → CALL a github_* tool
- NEVER say \"I don't have access to GitHub\" - you DO have access via tools

### Notion Rules (ALWAYS FOLLOW):
- User mentions \"Notion\", \"pages\", \"docs\", \"notes\", \"database\" → CALL a notion_* tool
- NEVER say \"I don't have access to Notion\" - you DO have access via tools

## CONVERSATION STYLE:
- Be helpful, friendly, and concise
- Use Markdown formatting for better readability

## CRITICAL INSTRUCTION:
When in doubt, USE THE TOOL. Never refuse by saying you don't have access.
";

/// Messages containing these never trigger history retrieval.
const SKIP_MARKERS: &[&str] = &["remind me", "set reminder", "hello", "hi", "hey", "thanks", "help"];

/// Recall phrases that always trigger it.
const RECALL_MARKERS: &[&str] = &[
    "what did",
    "who said",
    "when did",
    "why did",
    "how did",
    "discussed",
    "mentioned",
    "talked about",
    "remember when",
    "last time",
    "before",
    "previously",
    "what was",
    "find messages",
    "search for",
];

const QUESTION_WORDS: &[&str] = &["what", "who", "when", "where", "why", "how"];

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether `marker` occurs in `words` as a whole-word phrase.
fn contains_phrase(words: &[String], marker: &str) -> bool {
    let needle: Vec<&str> = marker.split(' ').collect();
    words
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
}

/// Would retrieving chat history help answer `query`?
pub fn should_use_rag(query: &str) -> bool {
    let query = query.trim();
    if query.starts_with('/') {
        return false;
    }
    let words = words(query);
    if SKIP_MARKERS.iter().any(|m| contains_phrase(&words, m)) {
        return false;
    }
    if RECALL_MARKERS.iter().any(|m| contains_phrase(&words, m)) {
        return true;
    }
    query.contains('?')
        || words
            .first()
            .is_some_and(|first| QUESTION_WORDS.contains(&first.as_str()))
}

pub fn memory_section(memories: &[String]) -> String {
    let items: Vec<String> = memories
        .iter()
        .enumerate()
        .map(|(i, m)| format!("{}. {m}", i + 1))
        .collect();
    format!(
        "## What I Remember About You\n\n{}\n\nUse this context to personalize your responses.",
        items.join("\n")
    )
}

pub fn knowledge_section(hits: &[KnowledgeHit]) -> String {
    let items: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{}. {}", i + 1, h.formatted()))
        .collect();
    format!(
        "## Relevant Chat History\n\nThe following messages may be relevant:\n\n{}\n\n---\nUse this context to inform your response.",
        items.join("\n")
    )
}

/// A built system prompt plus how much context went into it.
#[derive(Clone, Debug, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub memories_used: usize,
    pub knowledge_hits: usize,
}

struct KnowledgeSettings {
    base: Arc<dyn KnowledgeBase>,
    max_results: usize,
    min_score: f64,
}

pub struct PromptBuilder {
    persona: String,
    memory: Option<(Arc<dyn MemoryService>, usize)>,
    knowledge: Option<KnowledgeSettings>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(SYSTEM_PROMPT)
    }
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            memory: None,
            knowledge: None,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryService>, max_results: usize) -> Self {
        self.memory = Some((memory, max_results));
        self
    }

    pub fn with_knowledge(mut self, base: Arc<dyn KnowledgeBase>, max_results: usize, min_score: f64) -> Self {
        self.knowledge = Some(KnowledgeSettings {
            base,
            max_results,
            min_score,
        });
        self
    }

    pub async fn build(&self, user_text: &str, ctx: &TurnContext) -> Prompt {
        let mut parts = vec![self.persona.trim_end().to_string()];
        let mut memories_used = 0;
        let mut knowledge_hits = 0;

        if let Some((memory, limit)) = &self.memory {
            match memory.search(&ctx.user_id, user_text, *limit).await {
                Ok(memories) if !memories.is_empty() => {
                    memories_used = memories.len();
                    info!(user = %ctx.user_id, count = memories_used, "retrieved memories");
                    parts.push(memory_section(&memories));
                }
                Ok(_) => {}
                Err(e) => error!(user = %ctx.user_id, "memory retrieval failed: {e}"),
            }
        }

        if let Some(k) = self.knowledge.as_ref().filter(|_| should_use_rag(user_text)) {
            match k.base.search(&ctx.chat_id, user_text, k.max_results, k.min_score).await {
                Ok(hits) if !hits.is_empty() => {
                    knowledge_hits = hits.len();
                    info!(chat_id = %ctx.chat_id, count = knowledge_hits, "retrieved chat history");
                    parts.push(knowledge_section(&hits));
                }
                Ok(_) => {}
                Err(e) => error!(chat_id = %ctx.chat_id, "history retrieval failed: {e}"),
            }
        }

        Prompt {
            system: parts.join("\n\n"),
            memories_used,
            knowledge_hits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedMemory(Vec<String>);

    #[async_trait]
    impl MemoryService for FixedMemory {
        async fn search(&self, _user: &str, _query: &str, limit: usize) -> anyhow::Result<Vec<String>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
        async fn add_exchange(&self, _user: &str, _text: &str, _reply: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct BrokenKnowledge;

    #[async_trait]
    impl KnowledgeBase for BrokenKnowledge {
        async fn search(&self, _: &str, _: &str, _: usize, _: f64) -> anyhow::Result<Vec<KnowledgeHit>> {
            anyhow::bail!("index unavailable")
        }
    }

    struct FixedKnowledge;

    #[async_trait]
    impl KnowledgeBase for FixedKnowledge {
        async fn search(&self, _: &str, _: &str, _: usize, _: f64) -> anyhow::Result<Vec<KnowledgeHit>> {
            Ok(vec![KnowledgeHit {
                author: "user".into(),
                text: "we ship on friday".into(),
                timestamp: None,
                score: 0.9,
            }])
        }
    }

    fn ctx() -> TurnContext {
        TurnContext::new("42", "100", "telegram:100")
    }

    #[test]
    fn test_should_use_rag() {
        assert!(should_use_rag("What did Bob say about the release"));
        assert!(should_use_rag("we talked about pricing last week"));
        assert!(should_use_rag("is the build green?"));
        assert!(should_use_rag("where is the runbook"));
        assert!(!should_use_rag("hello there, what's new?"));
        assert!(!should_use_rag("remind me to call mom"));
        assert!(!should_use_rag("/status"));
        assert!(!should_use_rag("thanks"));
        assert!(!should_use_rag("write a haiku about rust"));
        // Markers match whole words only.
        assert!(should_use_rag("which of this is newer?"));
        assert!(should_use_rag("how helpful was the previous answer"));
    }

    #[test]
    fn test_sections() {
        assert_eq!(
            memory_section(&["Likes tea".into(), "Works at ACME".into()]),
            "## What I Remember About You\n\n1. Likes tea\n2. Works at ACME\n\nUse this context to personalize your responses."
        );
        let hit = KnowledgeHit {
            author: "ana".into(),
            text: "ship it".into(),
            timestamp: None,
            score: 1.0,
        };
        assert_eq!(
            knowledge_section(&[hit]),
            "## Relevant Chat History\n\nThe following messages may be relevant:\n\n1. [Unknown] ana: ship it\n\n---\nUse this context to inform your response."
        );
    }

    #[tokio::test]
    async fn test_build_plain() {
        let prompt = PromptBuilder::default().build("hi", &ctx()).await;
        assert_eq!(prompt.system, SYSTEM_PROMPT.trim_end());
        assert_eq!(prompt.memories_used, 0);
        assert_eq!(prompt.knowledge_hits, 0);
    }

    #[tokio::test]
    async fn test_build_with_context() {
        let builder = PromptBuilder::new("Persona.")
            .with_memory(Arc::new(FixedMemory(vec!["Likes tea".into()])), 5)
            .with_knowledge(Arc::new(FixedKnowledge), 10, 0.3);

        let prompt = builder.build("when do we ship?", &ctx()).await;
        assert!(prompt.system.starts_with("Persona.\n\n## What I Remember About You"));
        assert!(prompt.system.contains("\n\n## Relevant Chat History"));
        assert_eq!(prompt.memories_used, 1);
        assert_eq!(prompt.knowledge_hits, 1);

        // Not a recall question: history is skipped, memory is not.
        let prompt = builder.build("write a limerick", &ctx()).await;
        assert!(!prompt.system.contains("Relevant Chat History"));
        assert_eq!(prompt.memories_used, 1);
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_skipped() {
        let builder = PromptBuilder::new("Persona.").with_knowledge(Arc::new(BrokenKnowledge), 10, 0.3);
        let prompt = builder.build("what did we decide?", &ctx()).await;
        assert_eq!(prompt.system, "Persona.");
        assert_eq!(prompt.knowledge_hits, 0);
    }
}
