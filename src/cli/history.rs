use anyhow::Result;
use clap::{Args, Subcommand};

use modelchat::history::HistoryStore;
use modelchat::paths::Paths;

#[derive(Args)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistoryCommands,
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List users with stored history
    List,

    /// Show one user's history
    Show {
        /// User id
        user: String,

        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete one user's history
    Clear {
        /// User id
        user: String,
    },
}

pub async fn run(args: HistoryArgs, paths: &Paths) -> Result<()> {
    let history = HistoryStore::open(paths.history_file());

    match args.command {
        HistoryCommands::List => {
            let sessions = history.list_sessions(|_| true);
            if sessions.is_empty() {
                println!("No stored conversations.");
            }
            for session in sessions {
                println!(
                    "{:<16} {:>3} turns  {}",
                    session.user_id,
                    session.turns,
                    preview(session.last_message.as_deref().unwrap_or_default(), 60)
                );
            }
        }
        HistoryCommands::Show { user, format } => {
            let turns = history.get(&user);
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&turns)?),
                _ => {
                    if turns.is_empty() {
                        println!("No history for user {}.", user);
                    }
                    for turn in turns {
                        let role = serde_json::to_value(turn.role)?;
                        println!("{}: {}", role.as_str().unwrap_or_default(), turn.content);
                    }
                }
            }
        }
        HistoryCommands::Clear { user } => {
            println!("{}", history.clear(&user).message());
        }
    }

    Ok(())
}

/// First `max` characters on one line.
fn preview(text: &str, max: usize) -> String {
    let line: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() > max {
        format!("{}...", line.chars().take(max).collect::<String>())
    } else {
        line
    }
}
