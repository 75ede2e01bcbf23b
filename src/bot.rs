//! Channel-independent message handling: continuous sessions first, then
//! `#` commands.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::admin::{AdminStore, AdminVerb};
use crate::agent::{Backends, VisionAdapter};
use crate::chat::{TurnOrchestrator, TurnOutcome};
use crate::commands::{Access, CommandKind, format_menu, match_command};
use crate::config::SharedConfig;
use crate::history::HistoryStore;
use crate::moderation::{BANNED_MESSAGE, BanVerb, Identity, ModerationStore};
use crate::paths::Paths;
use crate::session::{ContinuousSessions, SESSION_NOT_ACTIVE_MESSAGE, SESSION_STOPPED_MESSAGE};
use crate::store::{DataStore, JsonDataFile};

pub const CHAT_USAGE_MESSAGE: &str = "Please add a message after #chat, e.g. #chat hello";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Image { url: String },
}

/// A message delivered by a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: String,
    pub group_id: Option<String>,
    pub raw_text: String,
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    pub fn text(user_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            group_id: None,
            raw_text: raw_text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.attachments.push(Attachment::Image { url: url.into() });
        self
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            group_id: self.group_id.clone(),
        }
    }

    pub fn first_image(&self) -> Option<&str> {
        self.attachments.iter().find_map(|a| match a {
            Attachment::Image { url } => Some(url.as_str()),
        })
    }
}

/// Where replies go.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn reply(&self, text: &str) -> Result<()>;
}

/// All stores plus the orchestrator, built once per process.
pub struct ChatBot {
    config: SharedConfig,
    moderation: Arc<ModerationStore>,
    admin: Arc<AdminStore>,
    history: Arc<HistoryStore>,
    chat: Arc<TurnOrchestrator>,
    sessions: Arc<ContinuousSessions>,
}

impl ChatBot {
    pub fn new(
        config: SharedConfig,
        moderation: Arc<ModerationStore>,
        admin: Arc<AdminStore>,
        history: Arc<HistoryStore>,
        chat: Arc<TurnOrchestrator>,
        sessions: Arc<ContinuousSessions>,
    ) -> Self {
        Self {
            config,
            moderation,
            admin,
            history,
            chat,
            sessions,
        }
    }

    /// Build every component from the files under `paths`.
    pub fn from_paths(config: SharedConfig, paths: &Paths) -> Result<Self> {
        paths.ensure_dirs()?;
        let snapshot = config.snapshot();

        let store: Arc<dyn DataStore> = Arc::new(JsonDataFile::from_paths(paths)?);
        let moderation = Arc::new(ModerationStore::new(store.clone()));
        let admin = Arc::new(AdminStore::new(store, config.clone()));
        let history = Arc::new(HistoryStore::open(paths.history_file()));
        let chat = Arc::new(TurnOrchestrator::new(
            config.clone(),
            moderation.clone(),
            admin.clone(),
            history.clone(),
            Backends::from_config(&snapshot, paths)?,
            Arc::new(VisionAdapter::from_config(&snapshot)?),
        ));

        Ok(Self::new(
            config,
            moderation,
            admin,
            history,
            chat,
            Arc::new(ContinuousSessions::new()),
        ))
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn moderation(&self) -> &Arc<ModerationStore> {
        &self.moderation
    }

    pub fn admin(&self) -> &Arc<AdminStore> {
        &self.admin
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn chat(&self) -> &Arc<TurnOrchestrator> {
        &self.chat
    }

    pub fn sessions(&self) -> &Arc<ContinuousSessions> {
        &self.sessions
    }

    /// Handle `message` and send the reply, if any, to `sink`.
    pub async fn dispatch(&self, message: &InboundMessage, sink: &dyn ReplySink) {
        if let Some(reply) = self.handle(message).await
            && let Err(e) = sink.reply(&reply).await
        {
            warn!(user = %message.user_id, "Failed to deliver reply: {:#}", e);
        }
    }

    /// The reply for `message`, or `None` when it is not for the bot.
    pub async fn handle(&self, message: &InboundMessage) -> Option<String> {
        let text = message.raw_text.trim();
        let user_id = message.user_id.as_str();

        if self.sessions.is_active(user_id) {
            return match match_command(text) {
                Some((cmd, _)) if cmd.kind == CommandKind::StopChat => {
                    self.sessions.stop(user_id);
                    Some(SESSION_STOPPED_MESSAGE.to_string())
                }
                Some((cmd, _)) => {
                    debug!(user = user_id, command = cmd.name, "Command ignored in continuous session");
                    None
                }
                None => Some(self.session_turn(message, text).await.reply),
            };
        }

        let (cmd, rest) = match_command(text)?;
        debug!(user = user_id, command = cmd.name, "Command");
        let identity = message.identity();

        let reply = match cmd.kind {
            CommandKind::Chat => {
                let image = message.first_image();
                if rest.is_empty() && image.is_none() {
                    CHAT_USAGE_MESSAGE.to_string()
                } else {
                    self.chat.handle_turn(&identity, rest, image).await.reply
                }
            }
            CommandKind::StartChat => {
                if self.moderation.is_banned(&identity) {
                    BANNED_MESSAGE.to_string()
                } else {
                    let enabled = self.config.snapshot().enable_continuous_session;
                    self.sessions
                        .start(user_id, enabled, self.history.has_history(user_id))
                        .message()
                        .to_string()
                }
            }
            CommandKind::StopChat => {
                if self.sessions.stop(user_id) {
                    SESSION_STOPPED_MESSAGE.to_string()
                } else {
                    SESSION_NOT_ACTIVE_MESSAGE.to_string()
                }
            }
            CommandKind::ClearHistory => self.history.clear(user_id).message().to_string(),
            CommandKind::Menu => format_menu(self.access(user_id)),
            CommandKind::Ban | CommandKind::Unban => {
                let verb = if cmd.kind == CommandKind::Ban {
                    BanVerb::Ban
                } else {
                    BanVerb::Unban
                };
                let (reply, _) = self.moderation.handle_ban_command(
                    &identity,
                    &self.admin.super_admin(),
                    &self.admin.admins(),
                    text,
                    verb,
                );
                reply
            }
            CommandKind::SystemPrompt => self.admin.handle_system_prompt_command(user_id, rest),
            CommandKind::AddClearWord => {
                self.admin
                    .handle_clear_word_command(user_id, rest, AdminVerb::Add)
            }
            CommandKind::RemoveClearWord => {
                self.admin
                    .handle_clear_word_command(user_id, rest, AdminVerb::Remove)
            }
            CommandKind::ListClearWords => self.admin.handle_list_clear_words(user_id),
            CommandKind::AddAdmin => self.admin.handle_admin_command(user_id, rest, AdminVerb::Add),
            CommandKind::RemoveAdmin => {
                self.admin
                    .handle_admin_command(user_id, rest, AdminVerb::Remove)
            }
            CommandKind::ListAdmins => self.admin.handle_list_admins(user_id),
        };
        Some(reply)
    }

    /// A moderation hit ends the session.
    async fn session_turn(&self, message: &InboundMessage, text: &str) -> TurnOutcome {
        let outcome = self
            .chat
            .handle_turn(&message.identity(), text, message.first_image())
            .await;
        if outcome.kind.is_moderated() {
            self.sessions.deactivate(&message.user_id);
        }
        outcome
    }

    fn access(&self, user_id: &str) -> Access {
        if self.admin.is_super_admin(user_id) {
            Access::SuperAdmin
        } else if self.admin.is_admin(user_id) {
            Access::Admin
        } else {
            Access::Everyone
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::moderation::{BLOCKED_WORD_MESSAGE, SUPER_ADMIN_PROTECTED_MESSAGE};
    use crate::session::{SESSION_DISABLED_MESSAGE, SESSION_RESUMED_MESSAGE, SESSION_STARTED_MESSAGE};
    use crate::testing::{Fixture, ROOT};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collector(Mutex<Vec<String>>);

    #[async_trait]
    impl ReplySink for Collector {
        async fn reply(&self, text: &str) -> Result<()> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    async fn say(bot: &ChatBot, user: &str, text: &str) -> Option<String> {
        bot.handle(&InboundMessage::text(user, text)).await
    }

    #[tokio::test]
    async fn plain_text_outside_session_is_ignored() {
        let f = Fixture::with_replies(vec![]);
        let bot = f.bot();
        assert_eq!(say(&bot, "42", "hello there").await, None);
        assert!(f.plain.inputs().is_empty());
    }

    #[tokio::test]
    async fn single_shot_chat() {
        let f = Fixture::with_replies(vec![Ok("Hi!".into())]);
        let bot = f.bot();

        assert_eq!(say(&bot, "42", "#chat hello").await.as_deref(), Some("Hi!"));
        assert_eq!(f.plain.inputs(), vec!["hello"]);
        assert_eq!(
            say(&bot, "42", "#chat").await.as_deref(),
            Some(CHAT_USAGE_MESSAGE)
        );
    }

    #[tokio::test]
    async fn session_routes_free_text_and_suppresses_commands() {
        let f = Fixture::with_replies(vec![Ok("one".into()), Ok("two".into())]);
        let bot = f.bot();

        assert_eq!(
            say(&bot, "42", "#start_chat").await.as_deref(),
            Some(SESSION_STARTED_MESSAGE)
        );
        assert_eq!(say(&bot, "42", "first").await.as_deref(), Some("one"));
        assert_eq!(say(&bot, "42", "#chat ignored").await, None);
        assert_eq!(say(&bot, "42", "second").await.as_deref(), Some("two"));
        assert_eq!(f.plain.inputs(), vec!["first", "second"]);

        assert_eq!(
            say(&bot, "42", "#stop_chat").await.as_deref(),
            Some(SESSION_STOPPED_MESSAGE)
        );
        assert_eq!(say(&bot, "42", "after").await, None);
        assert_eq!(
            say(&bot, "42", "#stop_chat").await.as_deref(),
            Some(SESSION_NOT_ACTIVE_MESSAGE)
        );
    }

    #[tokio::test]
    async fn session_greeting_reflects_history() {
        let f = Fixture::with_replies(vec![Ok("hey".into())]);
        let bot = f.bot();
        say(&bot, "42", "#chat hi").await;

        assert_eq!(
            say(&bot, "42", "#start_chat").await.as_deref(),
            Some(SESSION_RESUMED_MESSAGE)
        );
    }

    #[tokio::test]
    async fn disabled_sessions_never_start() {
        let config = Config {
            enable_continuous_session: false,
            ..Config::default()
        };
        let f = Fixture::new(config, vec![], "");
        let bot = f.bot();

        assert_eq!(
            say(&bot, "42", "#start_chat").await.as_deref(),
            Some(SESSION_DISABLED_MESSAGE)
        );
        assert!(!bot.sessions().is_active("42"));
    }

    #[tokio::test]
    async fn blocked_word_ends_session() {
        let f = Fixture::with_replies(vec![]);
        f.moderation.add_blocked_word("spam");
        let bot = f.bot();

        say(&bot, "42", "#start_chat").await;
        assert_eq!(
            say(&bot, "42", "cheap spam").await.as_deref(),
            Some(BLOCKED_WORD_MESSAGE)
        );
        assert!(!bot.sessions().is_active("42"));
        assert!(f.plain.inputs().is_empty());
    }

    #[tokio::test]
    async fn banned_user_cannot_start_session() {
        let f = Fixture::with_replies(vec![]);
        let bot = f.bot();
        say(&bot, ROOT, "#ban_chat user 42").await;

        assert_eq!(
            say(&bot, "42", "#start_chat").await.as_deref(),
            Some(BANNED_MESSAGE)
        );
        assert!(!bot.sessions().is_active("42"));
    }

    #[tokio::test]
    async fn admin_commands_flow_through() {
        let f = Fixture::with_replies(vec![]);
        let bot = f.bot();

        assert_eq!(
            say(&bot, ROOT, "#add_admin 2000").await.as_deref(),
            Some("Added user 2000 as an admin.")
        );
        assert_eq!(
            say(&bot, "2000", "#ban_chat word spam").await.as_deref(),
            Some("Added blocked word 'spam' to the list.")
        );
        assert_eq!(
            say(&bot, "2000", "#ban_chat user 1000").await.as_deref(),
            Some(SUPER_ADMIN_PROTECTED_MESSAGE)
        );
        assert!(f.moderation.contains_blocked_word("spam"));

        let menu = say(&bot, "2000", "#menu").await.unwrap();
        assert!(menu.contains("#ban_chat"));
        assert!(!menu.contains("#add_admin"));
    }

    #[tokio::test]
    async fn clear_history_command() {
        let f = Fixture::with_replies(vec![Ok("hey".into())]);
        let bot = f.bot();
        say(&bot, "42", "#chat hi").await;

        assert_eq!(
            say(&bot, "42", "#clear chat_history").await.as_deref(),
            Some("Chat history cleared.")
        );
        assert_eq!(
            say(&bot, "42", "#clear chat_history").await.as_deref(),
            Some("No chat history found for this user.")
        );
    }

    #[tokio::test]
    async fn dispatch_sends_reply_with_image() {
        let f = Fixture::new(Config::default(), vec![], "A cat.");
        let bot = f.bot();
        let sink = Collector::default();

        let message = InboundMessage::text("42", "#chat").with_image(f.image.clone());
        bot.dispatch(&message, &sink).await;
        bot.dispatch(&InboundMessage::text("42", "not a command"), &sink)
            .await;

        assert_eq!(*sink.0.lock().unwrap(), vec!["A cat.".to_string()]);
    }
}
