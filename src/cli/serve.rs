//! CLI subcommand: `modelchat serve`
//!
//! Runs the admin console and, when configured, the Telegram channel, all
//! sharing one set of stores.

use anyhow::Result;
use std::sync::Arc;
use tracing::error;

use modelchat::bot::ChatBot;
use modelchat::paths::Paths;
use modelchat::server::{Console, telegram};

pub async fn run(paths: &Paths) -> Result<()> {
    let config = super::load(paths)?;
    let snapshot = config.snapshot();
    let bot = Arc::new(ChatBot::from_paths(config, paths)?);

    println!("ModelChat v{}", env!("CARGO_PKG_VERSION"));
    println!("  Data: {}", paths.plugin_dir.display());
    println!(
        "  Model: {}",
        if snapshot.use_local_model {
            format!("{} (local)", snapshot.local_model)
        } else {
            snapshot.model.clone()
        }
    );

    // Spawn Telegram bot in background if configured
    let telegram_handle = if snapshot.telegram.as_ref().is_some_and(|t| t.enabled) {
        let tg_bot = bot.clone();
        println!("  Telegram: enabled");
        Some(tokio::spawn(async move {
            if let Err(e) = telegram::run_telegram_bot(tg_bot).await {
                error!("Telegram bot error: {}", e);
            }
        }))
    } else {
        None
    };

    if snapshot.console.enabled {
        println!(
            "  Console: http://{}:{}",
            snapshot.console.bind, snapshot.console.port
        );
        Console::new(bot).run().await?;
    } else if telegram_handle.is_some() {
        println!("  Console: disabled");
        tokio::signal::ctrl_c().await?;
    } else {
        println!("  Neither the console nor a channel is enabled. Use Ctrl+C to stop.");
        tokio::signal::ctrl_c().await?;
    }

    if let Some(handle) = telegram_handle {
        handle.abort();
    }

    Ok(())
}
