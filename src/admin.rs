//! Admins, the system prompt and output-filter ("clear") words.
//!
//! Shares the data document with [`crate::moderation`] and follows the same
//! discipline: one mutex around the in-memory copy, every change mirrored to
//! disk with a locked read-modify-write. The super-admin id comes from the
//! live config and is never stored in the admin list.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info};

use crate::config::SharedConfig;
use crate::moderation::{NO_PERMISSION_MESSAGE, SUPER_ADMIN_PROTECTED_MESSAGE};
use crate::store::{DEFAULT_SYSTEM_PROMPT, DataDocument, DataStore, insert_unique, remove_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminVerb {
    Add,
    Remove,
}

impl AdminVerb {
    fn word(self) -> &'static str {
        match self {
            AdminVerb::Add => "add",
            AdminVerb::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone)]
struct AdminState {
    admins: Vec<String>,
    system_prompt: String,
    clear_words: Vec<String>,
}

impl From<&DataDocument> for AdminState {
    fn from(doc: &DataDocument) -> Self {
        let system_prompt = if doc.system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            doc.system_prompt.clone()
        };
        Self {
            admins: doc.admins.clone(),
            system_prompt,
            clear_words: doc.cleanup_chars.clone(),
        }
    }
}

pub struct AdminStore {
    state: Mutex<AdminState>,
    store: Arc<dyn DataStore>,
    config: SharedConfig,
}

impl AdminStore {
    pub fn new(store: Arc<dyn DataStore>, config: SharedConfig) -> Self {
        let doc = store.load().unwrap_or_else(|e| {
            error!("Failed to load admin data: {}", e);
            DataDocument::default()
        });
        Self {
            state: Mutex::new(AdminState::from(&doc)),
            store,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AdminState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `mutate` to the in-memory copy and, if it changed anything,
    /// to the stored document.
    fn change<F>(&self, mutate: F) -> bool
    where
        F: Fn(&mut AdminState) -> bool,
    {
        let mut state = self.lock();
        if !mutate(&mut state) {
            return false;
        }

        let result = self.store.update(&mut |doc| {
            let mut copy = AdminState::from(&*doc);
            mutate(&mut copy);
            doc.admins = copy.admins;
            doc.system_prompt = copy.system_prompt;
            doc.cleanup_chars = copy.clear_words;
        });
        match result {
            Ok(doc) => *state = AdminState::from(&doc),
            Err(e) => error!("Failed to persist admin change: {}", e),
        }
        true
    }

    pub fn super_admin(&self) -> String {
        self.config.snapshot().root
    }

    pub fn is_super_admin(&self, user_id: &str) -> bool {
        self.config.snapshot().is_super_admin(user_id)
    }

    /// Stored admins or the super-admin.
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.is_super_admin(user_id) || self.lock().admins.iter().any(|a| a == user_id)
    }

    /// Stored admins, without the super-admin.
    pub fn admins(&self) -> Vec<String> {
        self.lock().admins.clone()
    }

    pub fn system_prompt(&self) -> String {
        self.lock().system_prompt.clone()
    }

    /// Blank prompts reset to the default.
    pub fn set_system_prompt(&self, prompt: &str) {
        let prompt = match prompt.trim() {
            "" => DEFAULT_SYSTEM_PROMPT.to_string(),
            p => p.to_string(),
        };
        self.change(|state| {
            state.system_prompt = prompt.clone();
            true
        });
        info!("System prompt updated");
    }

    pub fn clear_words(&self) -> Vec<String> {
        self.lock().clear_words.clone()
    }

    pub fn add_clear_word(&self, word: &str) -> bool {
        self.change(|state| insert_unique(&mut state.clear_words, word))
    }

    pub fn remove_clear_word(&self, word: &str) -> bool {
        self.change(|state| remove_value(&mut state.clear_words, word))
    }

    /// Substrings stripped from replies: config list first, then stored words.
    pub fn cleanup_list(&self) -> Vec<String> {
        let mut list = self.config.snapshot().cleanup_chars;
        for word in self.clear_words() {
            insert_unique(&mut list, &word);
        }
        list
    }

    fn add_admin(&self, id: &str) -> bool {
        self.change(|state| insert_unique(&mut state.admins, id))
    }

    fn remove_admin(&self, id: &str) -> bool {
        self.change(|state| remove_value(&mut state.admins, id))
    }

    /// `#add_admin <id>` / `#remove_admin <id>`, super-admin only.
    pub fn handle_admin_command(&self, actor: &str, arg: &str, verb: AdminVerb) -> String {
        if !self.is_super_admin(actor) {
            return format!(
                "{} Only the super-admin can {} admins.",
                NO_PERMISSION_MESSAGE,
                verb.word()
            );
        }

        let id = arg.trim();
        if id.is_empty() {
            return format!("Please provide the id of the admin to {}.", verb.word());
        }
        if self.is_super_admin(id) {
            return SUPER_ADMIN_PROTECTED_MESSAGE.to_string();
        }
        if !id.chars().all(|c| c.is_ascii_digit()) {
            return "Admin id must be numeric.".to_string();
        }

        match (verb, self.apply_admin(id, verb)) {
            (AdminVerb::Add, true) => format!("Added user {id} as an admin."),
            (AdminVerb::Remove, true) => format!("Removed user {id} from the admin list."),
            (AdminVerb::Add, false) => format!("User {id} is already an admin."),
            (AdminVerb::Remove, false) => format!("User {id} is not an admin."),
        }
    }

    fn apply_admin(&self, id: &str, verb: AdminVerb) -> bool {
        match verb {
            AdminVerb::Add => self.add_admin(id),
            AdminVerb::Remove => self.remove_admin(id),
        }
    }

    /// `#list_admins`, super-admin only.
    pub fn handle_list_admins(&self, actor: &str) -> String {
        if !self.is_super_admin(actor) {
            return NO_PERMISSION_MESSAGE.to_string();
        }
        let mut lines = vec![format!("{} (super-admin)", self.super_admin())];
        lines.extend(self.admins());
        format!("Current admins:\n{}", lines.join("\n"))
    }

    /// `#add_clear_word <word>` / `#remove_clear_word <word>`, super-admin only.
    pub fn handle_clear_word_command(&self, actor: &str, arg: &str, verb: AdminVerb) -> String {
        if !self.is_super_admin(actor) {
            return NO_PERMISSION_MESSAGE.to_string();
        }
        let word = arg.trim();
        if word.is_empty() {
            return format!("Please provide the clear word to {}.", verb.word());
        }
        let changed = match verb {
            AdminVerb::Add => self.add_clear_word(word),
            AdminVerb::Remove => self.remove_clear_word(word),
        };
        match (verb, changed) {
            (AdminVerb::Add, true) => format!("Added clear word '{word}' to the list."),
            (AdminVerb::Remove, true) => format!("Removed clear word '{word}' from the list."),
            (AdminVerb::Add, false) => format!("Clear word '{word}' is already in the list."),
            (AdminVerb::Remove, false) => format!("Clear word '{word}' is not in the list."),
        }
    }

    /// `#list_clear_words`, super-admin only.
    pub fn handle_list_clear_words(&self, actor: &str) -> String {
        if !self.is_super_admin(actor) {
            return NO_PERMISSION_MESSAGE.to_string();
        }
        let words = self.clear_words();
        if words.is_empty() {
            "No clear words are set.".to_string()
        } else {
            format!("Current clear words:\n{}", words.join("\n"))
        }
    }

    /// `#system_prompt [text]`, super-admin only. Without text, shows the
    /// current prompt.
    pub fn handle_system_prompt_command(&self, actor: &str, arg: &str) -> String {
        if !self.is_super_admin(actor) {
            return NO_PERMISSION_MESSAGE.to_string();
        }
        let prompt = arg.trim();
        if prompt.is_empty() {
            return format!("Current system prompt:\n{}", self.system_prompt());
        }
        self.set_system_prompt(prompt);
        "System prompt updated.".to_string()
    }
}
