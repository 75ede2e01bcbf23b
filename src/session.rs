//! Continuous-session mode: while active, a user's plain messages are chat
//! turns without a command prefix.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

pub const SESSION_DISABLED_MESSAGE: &str = "Continuous chat mode is not enabled.";
pub const SESSION_ALREADY_ACTIVE_MESSAGE: &str =
    "You are already in continuous chat mode. Send #stop_chat to leave.";
pub const SESSION_STARTED_MESSAGE: &str =
    "Continuous chat mode started. Just type to chat; send #stop_chat to leave.";
pub const SESSION_RESUMED_MESSAGE: &str =
    "Continuous chat mode started. Picking up where we left off; send #stop_chat to leave.";
pub const SESSION_STOPPED_MESSAGE: &str = "Continuous chat mode ended.";
pub const SESSION_NOT_ACTIVE_MESSAGE: &str = "You are not in continuous chat mode.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Disabled,
    AlreadyActive,
    Started { resumed: bool },
}

impl StartOutcome {
    pub fn message(self) -> &'static str {
        match self {
            StartOutcome::Disabled => SESSION_DISABLED_MESSAGE,
            StartOutcome::AlreadyActive => SESSION_ALREADY_ACTIVE_MESSAGE,
            StartOutcome::Started { resumed: false } => SESSION_STARTED_MESSAGE,
            StartOutcome::Started { resumed: true } => SESSION_RESUMED_MESSAGE,
        }
    }
}

/// Users currently in continuous-session mode.
#[derive(Debug, Default)]
pub struct ContinuousSessions {
    active: Mutex<HashSet<String>>,
}

impl ContinuousSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.lock().contains(user_id)
    }

    /// `has_history` picks the resumption greeting.
    pub fn start(&self, user_id: &str, enabled: bool, has_history: bool) -> StartOutcome {
        if !enabled {
            return StartOutcome::Disabled;
        }
        if !self.lock().insert(user_id.to_string()) {
            return StartOutcome::AlreadyActive;
        }
        info!(user = user_id, resumed = has_history, "Continuous session started");
        StartOutcome::Started {
            resumed: has_history,
        }
    }

    /// Returns whether the user was active.
    pub fn stop(&self, user_id: &str) -> bool {
        let was_active = self.lock().remove(user_id);
        if was_active {
            info!(user = user_id, "Continuous session stopped");
        }
        was_active
    }

    /// Forced exit after a moderation hit.
    pub fn deactivate(&self, user_id: &str) {
        if self.lock().remove(user_id) {
            info!(user = user_id, "Continuous session ended by moderation");
        }
    }

    pub fn active_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.lock().iter().cloned().collect();
        users.sort();
        users
    }
}
