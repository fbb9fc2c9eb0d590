//! Knowledge-base retrieval: the collaborator trait, the built-in
//! `search_knowledge_base` tool, and a keyword search over stored sessions.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;

use clawbot_core::session::SessionManager;
use clawbot_core::types::{Role, TurnContext};

use super::base::{require_string, Tool};

pub const SEARCH_TOOL_NAME: &str = "search_knowledge_base";

/// One retrieved message.
#[derive(Clone, Debug, PartialEq)]
pub struct KnowledgeHit {
    pub author: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    /// Relevance in `0.0..=1.0`.
    pub score: f64,
}

impl KnowledgeHit {
    /// `[Mar 04] user: text`, the line shape injected into prompts.
    pub fn formatted(&self) -> String {
        let date = self
            .timestamp
            .map(|t| t.format("%b %d").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        format!("[{date}] {}: {}", self.author, self.text)
    }
}

/// Search over previously seen chat messages.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Up to `limit` hits from `chat_id` scoring at least `min_score`, best first.
    async fn search(
        &self,
        chat_id: &str,
        query: &str,
        limit: usize,
        min_score: f64,
    ) -> anyhow::Result<Vec<KnowledgeHit>>;
}

// ─────────────────────────────────────────────
// search_knowledge_base
// ─────────────────────────────────────────────

pub struct SearchKnowledgeTool {
    knowledge: Arc<dyn KnowledgeBase>,
    max_results: usize,
    min_score: f64,
}

impl SearchKnowledgeTool {
    pub fn new(knowledge: Arc<dyn KnowledgeBase>, max_results: usize, min_score: f64) -> Self {
        Self {
            knowledge,
            max_results,
            min_score,
        }
    }
}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the knowledge base for relevant past messages and conversations"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &TurnContext) -> anyhow::Result<String> {
        let query = require_string(args, "query")?;
        let hits = self
            .knowledge
            .search(&ctx.chat_id, &query, self.max_results, self.min_score)
            .await?;

        if hits.is_empty() {
            return Ok("No relevant messages found in the knowledge base.".to_string());
        }
        let lines: Vec<String> = hits
            .iter()
            .map(|h| format!("- [{}]: {}", h.author, h.text))
            .collect();
        Ok(format!("Found relevant messages:\n{}", lines.join("\n")))
    }
}

// ─────────────────────────────────────────────
// Keyword search over sessions
// ─────────────────────────────────────────────

/// Scores stored turns by the share of query terms they contain.
pub struct SessionKnowledgeBase {
    sessions: Arc<SessionManager>,
}

impl SessionKnowledgeBase {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    /// Sessions of `chat_id` on any channel (`"{channel}:{chat_id}"`).
    fn session_keys(&self, chat_id: &str) -> Vec<String> {
        let suffix = format!(":{chat_id}");
        self.sessions
            .list_sessions()
            .into_iter()
            .map(|s| s.key)
            .filter(|key| key.ends_with(&suffix))
            .collect()
    }
}

/// Lowercased alphanumeric words of three or more characters.
pub(crate) fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

fn keyword_score(query_terms: &BTreeSet<String>, text: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let found = terms(text);
    let matched = query_terms.iter().filter(|t| found.contains(*t)).count();
    matched as f64 / query_terms.len() as f64
}

#[async_trait]
impl KnowledgeBase for SessionKnowledgeBase {
    async fn search(
        &self,
        chat_id: &str,
        query: &str,
        limit: usize,
        min_score: f64,
    ) -> anyhow::Result<Vec<KnowledgeHit>> {
        let query_terms = terms(query);
        let mut hits = Vec::new();

        for key in self.session_keys(chat_id) {
            for turn in self.sessions.get_or_create(&key).turns {
                let Some(text) = turn.text() else { continue };
                let score = keyword_score(&query_terms, &text);
                if score > 0.0 && score >= min_score {
                    let author = match turn.role {
                        Role::Assistant => "assistant",
                        Role::User | Role::ToolResult => "user",
                    };
                    hits.push(KnowledgeHit {
                        author: author.to_string(),
                        text,
                        timestamp: turn.timestamp,
                        score,
                    });
                }
            }
        }

        // Best score first; newer wins ties.
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        hits.truncate(limit);
        debug!(chat_id, hits = hits.len(), "knowledge search");
        Ok(hits)
    }
}
