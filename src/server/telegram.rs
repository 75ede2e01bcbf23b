//! Telegram channel.
//!
//! Turns Telegram updates into [`InboundMessage`]s for the shared
//! [`ChatBot`]. `/command` is accepted as a spelling of `#command`, and the
//! largest size of an attached photo becomes an image attachment.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, info, warn};

use crate::bot::{ChatBot, InboundMessage, ReplySink};

/// Maximum Telegram message length
const MAX_MESSAGE_LENGTH: usize = 4096;

struct BotState {
    chat: Arc<ChatBot>,
    token: String,
}

pub async fn run_telegram_bot(chat: Arc<ChatBot>) -> Result<()> {
    let config = chat.config().snapshot();
    let telegram_config = config
        .telegram
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Telegram config not found"))?;

    if !telegram_config.enabled {
        return Ok(());
    }

    let token = telegram_config.api_token.clone();
    if token.is_empty() || token.starts_with("${") {
        anyhow::bail!("Telegram API token not configured or not expanded");
    }

    let bot = Bot::new(&token);
    let state = Arc::new(BotState { chat, token });

    // Register bot commands so Telegram clients show the "/" menu
    let commands = crate::commands::telegram_bot_commands();
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("Failed to set bot commands: {}", e);
    }

    info!("Starting Telegram bot...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .default_handler(|_upd| async {})
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let text = msg.text().or(msg.caption()).unwrap_or_default();
    let mut inbound = InboundMessage::text(user.id.0.to_string(), command_text(text));
    if msg.chat.is_group() || msg.chat.is_supergroup() {
        inbound = inbound.in_group(msg.chat.id.0.to_string());
    }

    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        match bot.get_file(photo.file.id.clone()).await {
            Ok(file) => {
                inbound = inbound.with_image(file_url(&state.token, &file.path));
            }
            Err(e) => warn!("Failed to resolve Telegram photo: {}", e),
        }
    }

    if inbound.raw_text.is_empty() && inbound.attachments.is_empty() {
        return Ok(());
    }
    debug!(user = %inbound.user_id, "Telegram message");

    let sink = TelegramReply {
        bot,
        chat_id: msg.chat.id,
    };
    state.chat.dispatch(&inbound, &sink).await;
    Ok(())
}

struct TelegramReply {
    bot: Bot,
    chat_id: ChatId,
}

#[async_trait]
impl ReplySink for TelegramReply {
    async fn reply(&self, text: &str) -> Result<()> {
        for chunk in split_text_chunks(text) {
            self.bot.send_message(self.chat_id, chunk).await?;
        }
        Ok(())
    }
}

fn file_url(token: &str, path: &str) -> String {
    format!("https://api.telegram.org/file/bot{}/{}", token, path)
}

/// `/ban_chat@my_bot user 42` becomes `#ban_chat user 42`.
fn command_text(text: &str) -> String {
    let text = text.trim();
    let Some(rest) = text.strip_prefix('/') else {
        return text.to_string();
    };
    let (command, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let command = command.split('@').next().unwrap_or(command);
    if args.is_empty() {
        format!("#{}", command)
    } else {
        format!("#{} {}", command, args.trim())
    }
}

fn split_text_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + MAX_MESSAGE_LENGTH).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        chunks.push(&text[start..end]);
        start = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_commands_become_hash_commands() {
        assert_eq!(command_text("/start_chat"), "#start_chat");
        assert_eq!(command_text("/ban_chat@my_bot user 42"), "#ban_chat user 42");
        assert_eq!(command_text("/clear chat_history"), "#clear chat_history");
        assert_eq!(command_text("  hello "), "hello");
        assert_eq!(command_text("#chat hi"), "#chat hi");
    }

    #[test]
    fn long_replies_split_on_char_boundaries() {
        let text = "é".repeat(MAX_MESSAGE_LENGTH);
        let chunks = split_text_chunks(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() <= MAX_MESSAGE_LENGTH));
        assert_eq!(chunks.concat(), text);
        assert!(split_text_chunks("").is_empty());
    }

    #[test]
    fn photo_urls_embed_token() {
        assert_eq!(
            file_url("123:abc", "photos/file_1.jpg"),
            "https://api.telegram.org/file/bot123:abc/photos/file_1.jpg"
        );
    }
}
