use anyhow::Result;
use clap::Args;

use modelchat::bot::ChatBot;
use modelchat::moderation::Identity;
use modelchat::paths::Paths;

#[derive(Args)]
pub struct AskArgs {
    /// The message to send
    pub question: String,

    /// Sender id (history is kept per user)
    #[arg(short, long, default_value = "0")]
    pub user: String,

    /// Group id the message is sent from
    #[arg(short, long)]
    pub group: Option<String>,

    /// Image URL or local file to describe
    #[arg(short, long)]
    pub image: Option<String>,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub async fn run(args: AskArgs, paths: &Paths) -> Result<()> {
    let config = super::load(paths)?;
    let bot = ChatBot::from_paths(config, paths)?;

    let identity = Identity {
        user_id: args.user.clone(),
        group_id: args.group.clone(),
    };
    let outcome = bot
        .chat()
        .handle_turn(&identity, &args.question, args.image.as_deref())
        .await;

    match args.format.as_str() {
        "json" => {
            let output = serde_json::json!({
                "question": args.question,
                "reply": outcome.reply,
                "kind": outcome.kind,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("{}", outcome.reply);
        }
    }

    Ok(())
}
