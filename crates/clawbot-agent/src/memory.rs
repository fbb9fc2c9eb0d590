//! Long-term user memory.
//!
//! The conversation loop reads memories while building the prompt; the
//! runner hands each finished exchange to [`submit_exchange`], which stores
//! it in the background so replies never wait on it.
//!
//! [`FileMemory`] keeps one JSONL file per user under
//! `~/.clawbot/memory/{user}.jsonl` and recalls by keyword overlap.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use clawbot_core::utils;

use crate::tools::knowledge::terms;

/// Per-user fact store.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Up to `limit` remembered facts about `user_id` relevant to `query`.
    async fn search(&self, user_id: &str, query: &str, limit: usize) -> anyhow::Result<Vec<String>>;

    /// Extract and store whatever is worth remembering from one exchange.
    async fn add_exchange(&self, user_id: &str, user_text: &str, reply: &str) -> anyhow::Result<()>;
}

/// Store an exchange without waiting for it. Failures are logged.
pub fn submit_exchange(
    memory: Arc<dyn MemoryService>,
    user_id: String,
    user_text: String,
    reply: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match memory.add_exchange(&user_id, &user_text, &reply).await {
            Ok(()) => debug!(user = %user_id, "exchange submitted to memory"),
            Err(e) => warn!(user = %user_id, "memory update failed: {e}"),
        }
    })
}

// ─────────────────────────────────────────────
// FileMemory
// ─────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct MemoryEntry {
    fact: String,
    created_at: DateTime<Utc>,
}

pub struct FileMemory {
    dir: PathBuf,
}

impl FileMemory {
    /// `dir` defaults to `~/.clawbot/memory/`.
    pub fn new(dir: Option<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.unwrap_or_else(|| utils::get_data_path().join("memory"));
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn user_file(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", utils::safe_filename(user_id)))
    }

    async fn entries(&self, user_id: &str) -> anyhow::Result<Vec<MemoryEntry>> {
        let path = self.user_file(user_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

/// User statements worth keeping: not commands, not questions, not trivial.
fn is_memorable(text: &str) -> bool {
    let text = text.trim();
    !text.starts_with('/') && !text.ends_with('?') && terms(text).len() >= 2
}

#[async_trait]
impl MemoryService for FileMemory {
    async fn search(&self, user_id: &str, query: &str, limit: usize) -> anyhow::Result<Vec<String>> {
        let query_terms = terms(query);
        let mut scored: Vec<(usize, MemoryEntry)> = self
            .entries(user_id)
            .await?
            .into_iter()
            .map(|entry| {
                let found = terms(&entry.fact);
                (query_terms.intersection(&found).count(), entry)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.created_at.cmp(&a.1.created_at)));
        Ok(scored.into_iter().take(limit).map(|(_, e)| e.fact).collect())
    }

    async fn add_exchange(&self, user_id: &str, user_text: &str, _reply: &str) -> anyhow::Result<()> {
        if !is_memorable(user_text) {
            return Ok(());
        }
        let fact = user_text.trim().to_string();
        if self.entries(user_id).await?.iter().any(|e| e.fact == fact) {
            return Ok(());
        }

        let mut line = serde_json::to_string(&MemoryEntry {
            fact,
            created_at: Utc::now(),
        })?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.user_file(user_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
