pub mod ask;
pub mod chat;
pub mod config;
pub mod history;
pub mod paths;
pub mod serve;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use modelchat::config::SharedConfig;
use modelchat::paths::Paths;

#[derive(Parser)]
#[command(name = "modelchat")]
#[command(author, version, about = "Chat-bot bridge to cloud and local LLM backends")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Plugin directory (config.yml, data.json, history)
    #[arg(short, long, global = true, env = "MODELCHAT_DIR")]
    pub dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the admin console and configured channels
    Serve,

    /// Talk to the bot from the terminal
    Chat(chat::ChatArgs),

    /// Run a single chat turn
    Ask(ask::AskArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Inspect or clear conversation history
    History(history::HistoryArgs),

    /// Show resolved file paths
    Paths,
}

impl Cli {
    pub fn paths(&self) -> Result<Paths> {
        match &self.dir {
            Some(dir) => {
                let expanded = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
                Ok(Paths::at(expanded))
            }
            None => Paths::resolve(),
        }
    }
}

/// Live config from the plugin directory.
pub fn load(paths: &Paths) -> Result<SharedConfig> {
    SharedConfig::load(paths)
}
