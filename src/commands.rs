//! `#` command table shared by every channel.

/// Handler a command maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    StartChat,
    StopChat,
    Chat,
    ClearHistory,
    Menu,
    Ban,
    Unban,
    SystemPrompt,
    AddClearWord,
    RemoveClearWord,
    ListClearWords,
    AddAdmin,
    RemoveAdmin,
    ListAdmins,
}

/// Who the menu lists a command for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    Everyone,
    Admin,
    SuperAdmin,
}

pub struct BotCommand {
    pub name: &'static str,
    pub kind: CommandKind,
    pub description: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub access: Access,
}

impl BotCommand {
    /// e.g. "  #menu, #help           - Show this menu"
    fn help_line(&self) -> String {
        let mut names = self.name.to_string();
        for alias in self.aliases {
            names.push_str(&format!(", {}", alias));
        }
        if !self.usage.is_empty() {
            names.push_str(&format!(" {}", self.usage));
        }
        format!("  {:<28}- {}", names, self.description)
    }

    fn spellings(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

pub const COMMANDS: &[BotCommand] = &[
    BotCommand {
        name: "#chat",
        kind: CommandKind::Chat,
        description: "Ask the assistant a single question",
        aliases: &[],
        usage: "<message>",
        access: Access::Everyone,
    },
    BotCommand {
        name: "#start_chat",
        kind: CommandKind::StartChat,
        description: "Enter continuous chat mode",
        aliases: &[],
        usage: "",
        access: Access::Everyone,
    },
    BotCommand {
        name: "#stop_chat",
        kind: CommandKind::StopChat,
        description: "Leave continuous chat mode",
        aliases: &[],
        usage: "",
        access: Access::Everyone,
    },
    BotCommand {
        name: "#clear chat_history",
        kind: CommandKind::ClearHistory,
        description: "Forget your conversation history",
        aliases: &[],
        usage: "",
        access: Access::Everyone,
    },
    BotCommand {
        name: "#menu",
        kind: CommandKind::Menu,
        description: "Show this menu",
        aliases: &["#help"],
        usage: "",
        access: Access::Everyone,
    },
    BotCommand {
        name: "#ban_chat",
        kind: CommandKind::Ban,
        description: "Ban a group, user or word",
        aliases: &[],
        usage: "group|user|word <target>",
        access: Access::Admin,
    },
    BotCommand {
        name: "#ban_remove",
        kind: CommandKind::Unban,
        description: "Lift a ban",
        aliases: &[],
        usage: "group|user|word <target>",
        access: Access::Admin,
    },
    BotCommand {
        name: "#system_prompt",
        kind: CommandKind::SystemPrompt,
        description: "Show or set the system prompt",
        aliases: &[],
        usage: "[text]",
        access: Access::SuperAdmin,
    },
    BotCommand {
        name: "#add_clear_word",
        kind: CommandKind::AddClearWord,
        description: "Strip a word from replies",
        aliases: &[],
        usage: "<word>",
        access: Access::SuperAdmin,
    },
    BotCommand {
        name: "#remove_clear_word",
        kind: CommandKind::RemoveClearWord,
        description: "Stop stripping a word",
        aliases: &[],
        usage: "<word>",
        access: Access::SuperAdmin,
    },
    BotCommand {
        name: "#list_clear_words",
        kind: CommandKind::ListClearWords,
        description: "List stripped words",
        aliases: &[],
        usage: "",
        access: Access::SuperAdmin,
    },
    BotCommand {
        name: "#add_admin",
        kind: CommandKind::AddAdmin,
        description: "Grant admin rights",
        aliases: &[],
        usage: "<user id>",
        access: Access::SuperAdmin,
    },
    BotCommand {
        name: "#remove_admin",
        kind: CommandKind::RemoveAdmin,
        description: "Revoke admin rights",
        aliases: &[],
        usage: "<user id>",
        access: Access::SuperAdmin,
    },
    BotCommand {
        name: "#list_admins",
        kind: CommandKind::ListAdmins,
        description: "List admins",
        aliases: &[],
        usage: "",
        access: Access::SuperAdmin,
    },
];

/// Match the command `text` starts with, preferring the longest spelling.
/// Returns the command and the trimmed remainder.
pub fn match_command(text: &str) -> Option<(&'static BotCommand, &str)> {
    let text = text.trim_start();
    COMMANDS
        .iter()
        .flat_map(|cmd| cmd.spellings().map(move |s| (cmd, s)))
        .filter(|(_, spelling)| {
            text.strip_prefix(spelling)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
        })
        .max_by_key(|(_, spelling)| spelling.len())
        .map(|(cmd, spelling)| (cmd, text[spelling.len()..].trim()))
}

/// Menu for a user with the given access level.
pub fn format_menu(access: Access) -> String {
    let mut lines = vec!["Commands:".to_string()];
    let mut section = Access::Everyone;
    for cmd in COMMANDS.iter().filter(|c| c.access <= access) {
        if cmd.access != section {
            section = cmd.access;
            lines.push(match section {
                Access::Admin => "Admin commands:".to_string(),
                _ => "Super-admin commands:".to_string(),
            });
        }
        lines.push(cmd.help_line());
    }
    lines.join("\n")
}

/// Commands for Telegram's setMyCommands. Telegram names cannot contain
/// spaces, so multi-word commands are left out.
pub fn telegram_bot_commands() -> Vec<teloxide::types::BotCommand> {
    COMMANDS
        .iter()
        .filter(|cmd| cmd.access == Access::Everyone && !cmd.name.contains(' '))
        .map(|cmd| teloxide::types::BotCommand::new(&cmd.name[1..], cmd.description))
        .collect()
}
