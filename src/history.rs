//! Per-user conversation memory, persisted to `cache/history.json`.
//!
//! Each user keeps at most `memory_length` turns; the oldest are dropped
//! first. The whole map is rewritten atomically after every mutation.
//! A failed write is logged and the in-memory change is kept.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

use crate::store::write_json_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

/// One stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    #[serde(default)]
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared,
    NotFound,
}

impl ClearOutcome {
    pub fn message(self) -> &'static str {
        match self {
            ClearOutcome::Cleared => "Chat history cleared.",
            ClearOutcome::NotFound => "No chat history found for this user.",
        }
    }
}

/// Summary row for the console's session list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub user_id: String,
    pub turns: usize,
    pub last_message: Option<String>,
}

pub struct HistoryStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, Vec<Turn>>>,
}

impl HistoryStore {
    /// Load from `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = read_entries(&path);
        debug!(
            "Loaded history from {:?} ({} users)",
            path,
            entries.len()
        );
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    /// History that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Turn>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Turns for `user_id`, oldest first; empty for unknown users.
    pub fn get(&self, user_id: &str) -> Vec<Turn> {
        self.lock().get(user_id).cloned().unwrap_or_default()
    }

    pub fn has_history(&self, user_id: &str) -> bool {
        self.lock().get(user_id).is_some_and(|turns| !turns.is_empty())
    }

    /// Push `turn`, then evict from the front down to `memory_length`.
    pub fn append(&self, user_id: &str, turn: Turn, memory_length: usize) {
        let mut entries = self.lock();
        let turns = entries.entry(user_id.to_string()).or_default();
        turns.push(turn);
        if turns.len() > memory_length {
            let excess = turns.len() - memory_length;
            turns.drain(..excess);
        }
        self.persist(&entries);
    }

    pub fn clear(&self, user_id: &str) -> ClearOutcome {
        if self.delete(user_id) {
            ClearOutcome::Cleared
        } else {
            ClearOutcome::NotFound
        }
    }

    /// Remove the user's history. Returns whether anything was removed.
    pub fn delete(&self, user_id: &str) -> bool {
        let mut entries = self.lock();
        if entries.remove(user_id).is_none() {
            return false;
        }
        self.persist(&entries);
        true
    }

    /// Users with history, optionally filtered by id.
    pub fn list_sessions<F>(&self, filter: F) -> Vec<SessionSummary>
    where
        F: Fn(&str) -> bool,
    {
        self.lock()
            .iter()
            .filter(|(user_id, _)| filter(user_id))
            .map(|(user_id, turns)| SessionSummary {
                user_id: user_id.clone(),
                turns: turns.len(),
                last_message: turns.last().map(|t| t.content.clone()),
            })
            .collect()
    }

    fn persist(&self, entries: &BTreeMap<String, Vec<Turn>>) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_json_atomic(path, entries) {
            error!("Failed to save history to {:?}: {}", path, e);
        }
    }
}

fn read_entries(path: &Path) -> BTreeMap<String, Vec<Turn>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!("Failed to read history {:?}: {}", path, e);
            return BTreeMap::new();
        }
    };
    if content.trim().is_empty() {
        return BTreeMap::new();
    }
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!("Corrupt history file {:?}, starting empty: {}", path, e);
        BTreeMap::new()
    })
}
