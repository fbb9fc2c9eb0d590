//! Session persistence and caching.
//!
//! File format: JSONL in `~/.clawbot/sessions/{safe_key}.jsonl`
//! - Line 1: `{"_type":"metadata","created_at":"...","updated_at":"...","metadata":{}}`
//! - Line 2+: one `ConversationTurn` per line

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{ConversationTurn, Session};
use crate::utils;

#[derive(Debug, Serialize, Deserialize)]
struct SessionHeader {
    #[serde(rename = "_type")]
    record_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

/// Conversation history store with an in-memory cache over JSONL files.
pub struct SessionManager {
    sessions_dir: PathBuf,
    cache: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    /// Open (and create if needed) the sessions directory.
    ///
    /// `sessions_dir` defaults to `~/.clawbot/sessions/`.
    pub fn new(sessions_dir: Option<PathBuf>) -> std::io::Result<Self> {
        let dir = sessions_dir.unwrap_or_else(utils::get_sessions_path);
        std::fs::create_dir_all(&dir)?;
        Ok(SessionManager {
            sessions_dir: dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Cached session, else the one on disk, else a fresh one.
    pub fn get_or_create(&self, key: &str) -> Session {
        if let Some(session) = self.read_cache().get(key) {
            return session.clone();
        }
        let session = self.load_from_disk(key).unwrap_or_else(|| Session::new(key));
        self.write_cache().insert(key.to_string(), session.clone());
        session
    }

    /// Append a turn and persist the session.
    pub fn append(&self, key: &str, turn: ConversationTurn) {
        self.update(key, |session| session.add_turn(turn.stamped()));
    }

    /// The last `max_turns` turns of a session, oldest first.
    pub fn history(&self, key: &str, max_turns: usize) -> Vec<ConversationTurn> {
        self.get_or_create(key).history(max_turns)
    }

    /// Drop every turn but keep the session file.
    pub fn clear(&self, key: &str) {
        self.update(key, Session::clear);
    }

    /// Remove a session from cache and disk. Returns whether a file existed.
    pub fn delete(&self, key: &str) -> bool {
        self.write_cache().remove(key);
        let path = self.session_path(key);
        if !path.exists() {
            return false;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(session = %key, "deleted session file");
                true
            }
            Err(e) => {
                warn!(session = %key, "failed to delete session file: {e}");
                false
            }
        }
    }

    /// Sessions on disk, most recently updated first.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let entries = match std::fs::read_dir(&self.sessions_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("failed to read sessions directory: {e}");
                return Vec::new();
            }
        };

        let mut summaries: Vec<SessionSummary> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
            .filter_map(|path| {
                let file = std::fs::File::open(&path).ok()?;
                let first = std::io::BufReader::new(file).lines().next()?.ok()?;
                let header: SessionHeader = serde_json::from_str(&first).ok()?;
                let key = path.file_stem()?.to_str()?.replacen('_', ":", 1);
                Some(SessionSummary {
                    key,
                    created_at: header.created_at,
                    updated_at: header.updated_at,
                    path,
                })
            })
            .collect();

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    fn update(&self, key: &str, change: impl FnOnce(&mut Session)) {
        let mut session = self.get_or_create(key);
        change(&mut session);
        self.write_cache().insert(key.to_string(), session.clone());
        if let Err(e) = self.save_to_disk(&session) {
            warn!(session = %key, "failed to persist session: {e}");
        }
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session_path(&self, key: &str) -> PathBuf {
        let safe_key = utils::safe_filename(&key.replacen(':', "_", 1));
        self.sessions_dir.join(format!("{safe_key}.jsonl"))
    }

    fn load_from_disk(&self, key: &str) -> Option<Session> {
        let path = self.session_path(key);
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("failed to open session file {}: {e}", path.display());
                return None;
            }
        };

        let mut session = Session::new(key);
        for line in std::io::BufReader::new(file).lines().map_while(Result::ok) {
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(header) = serde_json::from_str::<SessionHeader>(&line) {
                if header.record_type == "metadata" {
                    session.created_at = header.created_at;
                    session.updated_at = header.updated_at;
                    session.metadata = header.metadata;
                    continue;
                }
            }
            match serde_json::from_str::<ConversationTurn>(&line) {
                Ok(turn) => session.turns.push(turn),
                Err(e) => warn!(session = %key, "skipping unreadable turn: {e}"),
            }
        }

        debug!(session = %key, turns = session.turns.len(), "loaded session from disk");
        Some(session)
    }

    fn save_to_disk(&self, session: &Session) -> std::io::Result<()> {
        let path = self.session_path(&session.key);
        let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);

        let header = SessionHeader {
            record_type: "metadata".to_string(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            metadata: session.metadata.clone(),
        };
        writeln!(file, "{}", serde_json::to_string(&header)?)?;
        for turn in &session.turns {
            writeln!(file, "{}", serde_json::to_string(turn)?)?;
        }
        file.flush()
    }
}

/// Listing entry for a stored session.
#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub path: PathBuf,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
