//! Ban lists and blocked words.
//!
//! One mutex per store instance serializes every mutation; reads copy the
//! lists out under the lock. Mutations are mirrored to the data document
//! through [`DataStore::update`], so changes made by another process are
//! picked up on the next write.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info};

use crate::store::{DataDocument, DataStore, insert_unique, remove_value};

pub const BANNED_MESSAGE: &str = "You or your group has been banned from using this feature.";
pub const BLOCKED_WORD_MESSAGE: &str =
    "Your message contains a blocked word and cannot be processed.";
pub const BLOCKED_IMAGE_MESSAGE: &str =
    "The image content contains a blocked word and cannot be processed.";
pub const NO_PERMISSION_MESSAGE: &str = "You do not have permission to perform this operation.";
pub const SUPER_ADMIN_PROTECTED_MESSAGE: &str =
    "Cannot perform this operation on the super-admin.";

/// Who sent a message: a user, optionally inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: String,
    pub group_id: Option<String>,
}

impl Identity {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            group_id: None,
        }
    }

    pub fn in_group(user_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            group_id: Some(group_id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanKind {
    User,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanVerb {
    Ban,
    Unban,
}

impl BanVerb {
    fn command(self) -> &'static str {
        match self {
            BanVerb::Ban => "#ban_chat",
            BanVerb::Unban => "#ban_remove",
        }
    }
}

/// Snapshot of the moderation lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Banlist {
    pub banned_groups: Vec<String>,
    pub banned_users: Vec<String>,
    pub blocked_words: Vec<String>,
}

impl From<&DataDocument> for Banlist {
    fn from(doc: &DataDocument) -> Self {
        Self {
            banned_groups: doc.banned_groups.clone(),
            banned_users: doc.banned_users.clone(),
            blocked_words: doc.blocked_words.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum List {
    Users,
    Groups,
    Words,
}

impl List {
    fn of_state(self, state: &mut Banlist) -> &mut Vec<String> {
        match self {
            List::Users => &mut state.banned_users,
            List::Groups => &mut state.banned_groups,
            List::Words => &mut state.blocked_words,
        }
    }

    fn of_doc(self, doc: &mut DataDocument) -> &mut Vec<String> {
        match self {
            List::Users => &mut doc.banned_users,
            List::Groups => &mut doc.banned_groups,
            List::Words => &mut doc.blocked_words,
        }
    }
}

impl From<BanKind> for List {
    fn from(kind: BanKind) -> Self {
        match kind {
            BanKind::User => List::Users,
            BanKind::Group => List::Groups,
        }
    }
}

pub struct ModerationStore {
    state: Mutex<Banlist>,
    store: Arc<dyn DataStore>,
}

impl ModerationStore {
    /// Load the lists once; an unreadable document starts empty.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        let state = match store.load() {
            Ok(doc) => Banlist::from(&doc),
            Err(e) => {
                error!("Failed to load moderation lists: {}", e);
                Banlist::default()
            }
        };
        Self {
            state: Mutex::new(state),
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Banlist> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True if the user is banned, or the group is (when present).
    pub fn is_banned(&self, identity: &Identity) -> bool {
        let state = self.lock();
        state.banned_users.iter().any(|u| *u == identity.user_id)
            || identity
                .group_id
                .as_ref()
                .is_some_and(|g| state.banned_groups.iter().any(|b| b == g))
    }

    /// Case-sensitive literal substring match against every blocked word.
    pub fn contains_blocked_word(&self, text: &str) -> bool {
        let words = self.lock().blocked_words.clone();
        words.iter().any(|w| !w.is_empty() && text.contains(w.as_str()))
    }

    pub fn add_ban(&self, kind: BanKind, target: &str) -> bool {
        self.toggle(kind.into(), target, true)
    }

    pub fn remove_ban(&self, kind: BanKind, target: &str) -> bool {
        self.toggle(kind.into(), target, false)
    }

    pub fn add_blocked_word(&self, word: &str) -> bool {
        self.toggle(List::Words, word, true)
    }

    pub fn remove_blocked_word(&self, word: &str) -> bool {
        self.toggle(List::Words, word, false)
    }

    pub fn get_banlist(&self) -> Banlist {
        self.lock().clone()
    }

    pub fn blocked_words(&self) -> Vec<String> {
        self.lock().blocked_words.clone()
    }

    fn toggle(&self, list: List, value: &str, insert: bool) -> bool {
        let apply = |items: &mut Vec<String>| {
            if insert {
                insert_unique(items, value)
            } else {
                remove_value(items, value)
            }
        };

        let mut state = self.lock();
        if !apply(list.of_state(&mut state)) {
            return false;
        }

        match self.store.update(&mut |doc| {
            apply(list.of_doc(doc));
        }) {
            Ok(doc) => *state = Banlist::from(&doc),
            Err(e) => error!("Failed to persist moderation change: {}", e),
        }
        true
    }

    /// Parse `<verb> <group|user|word> <target>` from an admin.
    ///
    /// Returns the reply and whether the caller should stop processing the
    /// message (permission and ban rejections).
    pub fn handle_ban_command(
        &self,
        actor: &Identity,
        super_admin_id: &str,
        admins: &[String],
        raw_text: &str,
        verb: BanVerb,
    ) -> (String, bool) {
        let is_super_admin = !super_admin_id.is_empty() && actor.user_id == super_admin_id;
        if !is_super_admin && !admins.iter().any(|a| *a == actor.user_id) {
            return (NO_PERMISSION_MESSAGE.to_string(), true);
        }

        if self.is_banned(actor) {
            return (BANNED_MESSAGE.to_string(), true);
        }

        let parts: Vec<&str> = raw_text.split_whitespace().collect();
        let command = verb.command();
        let usage = format!(
            "Invalid command format. Usage: {command} group <group id> | {command} user <user id> | {command} word <blocked word>"
        );
        if parts.len() < 3 {
            return (usage, false);
        }

        let (action, target) = (parts[1], parts[2]);

        if verb == BanVerb::Ban
            && matches!(action, "group" | "user")
            && !super_admin_id.is_empty()
            && target == super_admin_id
        {
            return (SUPER_ADMIN_PROTECTED_MESSAGE.to_string(), false);
        }

        let reply = match action {
            "group" | "user" => {
                let (kind, label) = if action == "group" {
                    (BanKind::Group, "Group")
                } else {
                    (BanKind::User, "User")
                };
                if !target.chars().all(|c| c.is_ascii_digit()) {
                    return (format!("{label} id must be numeric."), false);
                }
                let changed = match verb {
                    BanVerb::Ban => self.add_ban(kind, target),
                    BanVerb::Unban => self.remove_ban(kind, target),
                };
                match (verb, changed) {
                    (BanVerb::Ban, true) => format!("Added {} {target} to the ban list.", action),
                    (BanVerb::Unban, true) => {
                        format!("Removed {} {target} from the ban list.", action)
                    }
                    (BanVerb::Ban, false) => format!("{label} {target} is already in the ban list."),
                    (BanVerb::Unban, false) => format!("{label} {target} is not in the ban list."),
                }
            }
            "word" => {
                let changed = match verb {
                    BanVerb::Ban => self.add_blocked_word(target),
                    BanVerb::Unban => self.remove_blocked_word(target),
                };
                match (verb, changed) {
                    (BanVerb::Ban, true) => format!("Added blocked word '{target}' to the list."),
                    (BanVerb::Unban, true) => {
                        format!("Removed blocked word '{target}' from the list.")
                    }
                    (BanVerb::Ban, false) => format!("Blocked word '{target}' is already in the list."),
                    (BanVerb::Unban, false) => format!("Blocked word '{target}' is not in the list."),
                }
            }
            _ => return (usage, false),
        };

        info!(actor = %actor.user_id, command, action, target, "Moderation command applied");
        (reply, false)
    }
}
