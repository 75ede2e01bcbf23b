use anyhow::Result;
use clap::Parser;

mod cli;

use cli::{Cli, Commands};
use modelchat::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let paths = cli.paths()?;

    // RUST_LOG wins, then --verbose, then logging.level from config.yml
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        Config::load(&paths)
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match cli.command {
        Commands::Serve => cli::serve::run(&paths).await,
        Commands::Chat(args) => cli::chat::run(args, &paths).await,
        Commands::Ask(args) => cli::ask::run(args, &paths).await,
        Commands::Config(args) => cli::config::run(args, &paths).await,
        Commands::History(args) => cli::history::run(args, &paths).await,
        Commands::Paths => cli::paths::run(&paths),
    }
}
