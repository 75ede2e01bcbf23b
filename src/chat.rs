//! One conversation turn: moderation, optional vision, model dispatch and
//! history bookkeeping.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::admin::AdminStore;
use crate::agent::{Backends, ChatError, TurnRequest, VisionAdapter};
use crate::config::SharedConfig;
use crate::history::{HistoryStore, Turn};
use crate::moderation::{
    BANNED_MESSAGE, BLOCKED_IMAGE_MESSAGE, BLOCKED_WORD_MESSAGE, Identity, ModerationStore,
};

pub const FALLBACK_REPLY: &str = "Sorry, I didn't understand what you meant.";
pub const IMAGE_PLACEHOLDER: &str = "[user sent an image]";
pub const DEFAULT_VISION_PROMPT: &str = "Please describe this image";

fn vision_disabled_input(text: &str) -> String {
    format!(
        "The user sent an image, but image recognition is not enabled. The user said: {}",
        text
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Replied,
    Banned,
    BlockedInput,
    BlockedImage,
    Failed,
}

impl TurnKind {
    /// Outcomes produced by the moderation checks.
    pub fn is_moderated(self) -> bool {
        matches!(
            self,
            TurnKind::Banned | TurnKind::BlockedInput | TurnKind::BlockedImage
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub kind: TurnKind,
}

impl TurnOutcome {
    fn new(reply: impl Into<String>, kind: TurnKind) -> Self {
        Self {
            reply: reply.into(),
            kind,
        }
    }
}

pub struct TurnOrchestrator {
    config: SharedConfig,
    moderation: Arc<ModerationStore>,
    admin: Arc<AdminStore>,
    history: Arc<HistoryStore>,
    backends: Backends,
    vision: Arc<VisionAdapter>,
}

impl TurnOrchestrator {
    pub fn new(
        config: SharedConfig,
        moderation: Arc<ModerationStore>,
        admin: Arc<AdminStore>,
        history: Arc<HistoryStore>,
        backends: Backends,
        vision: Arc<VisionAdapter>,
    ) -> Self {
        Self {
            config,
            moderation,
            admin,
            history,
            backends,
            vision,
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Run one turn. Never fails; errors become reply text.
    pub async fn handle_turn(
        &self,
        identity: &Identity,
        text: &str,
        image_url: Option<&str>,
    ) -> TurnOutcome {
        if self.moderation.is_banned(identity) {
            info!(user = %identity.user_id, group = ?identity.group_id, "Banned sender");
            return TurnOutcome::new(BANNED_MESSAGE, TurnKind::Banned);
        }
        if self.moderation.contains_blocked_word(text) {
            info!(user = %identity.user_id, "Message contains a blocked word");
            return TurnOutcome::new(BLOCKED_WORD_MESSAGE, TurnKind::BlockedInput);
        }

        let config = self.config.snapshot();
        let cleanup = self.admin.cleanup_list();
        let user_id = identity.user_id.as_str();

        let input = match image_url {
            Some(url) if config.enable_vision => {
                return self
                    .describe_image(user_id, url, text, &cleanup, config.memory_length)
                    .await;
            }
            Some(_) => vision_disabled_input(text),
            None => text.to_string(),
        };

        let history = self.history.get(user_id);
        let system_prompt = self.admin.system_prompt();
        let request = TurnRequest {
            system_prompt: &system_prompt,
            history: &history,
            input: &input,
            cleanup: &cleanup,
        };

        let backend = self.backends.select(config.enable_mcp);
        match backend.respond(&request).await {
            Ok(reply) => {
                debug!(user = user_id, "Model replied with {} chars", reply.len());
                self.record(user_id, &input, &reply, config.memory_length);
                TurnOutcome::new(or_fallback(reply), TurnKind::Replied)
            }
            Err(e) => failed(user_id, e),
        }
    }

    /// The description is the final reply; the chat model is not called.
    async fn describe_image(
        &self,
        user_id: &str,
        url: &str,
        text: &str,
        cleanup: &[String],
        memory_length: usize,
    ) -> TurnOutcome {
        let prompt = match text.trim() {
            "" => DEFAULT_VISION_PROMPT,
            t => t,
        };

        match self.vision.describe(url, prompt, cleanup).await {
            Ok(description) if self.moderation.contains_blocked_word(&description) => {
                info!(user = user_id, "Image description contains a blocked word");
                TurnOutcome::new(BLOCKED_IMAGE_MESSAGE, TurnKind::BlockedImage)
            }
            Ok(description) => {
                self.record(user_id, IMAGE_PLACEHOLDER, &description, memory_length);
                TurnOutcome::new(or_fallback(description), TurnKind::Replied)
            }
            Err(e) => failed(user_id, e),
        }
    }

    /// The user turn is always kept; an empty model reply is not.
    fn record(&self, user_id: &str, input: &str, reply: &str, memory_length: usize) {
        self.history.append(user_id, Turn::user(input), memory_length);
        if !reply.is_empty() {
            self.history
                .append(user_id, Turn::assistant(reply), memory_length);
        }
    }
}

fn or_fallback(reply: String) -> String {
    if reply.trim().is_empty() {
        FALLBACK_REPLY.to_string()
    } else {
        reply
    }
}

fn failed(user_id: &str, err: ChatError) -> TurnOutcome {
    warn!(user = user_id, "Turn failed: {}", err);
    TurnOutcome::new(err.user_message(), TurnKind::Failed)
}
