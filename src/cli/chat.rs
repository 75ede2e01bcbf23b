use anyhow::Result;
use clap::Args;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use modelchat::bot::{ChatBot, InboundMessage};
use modelchat::paths::Paths;

#[derive(Args)]
pub struct ChatArgs {
    /// Sender id (history is kept per user)
    #[arg(short, long, default_value = "0")]
    pub user: String,

    /// Group id the messages are sent from
    #[arg(short, long)]
    pub group: Option<String>,
}

pub async fn run(args: ChatArgs, paths: &Paths) -> Result<()> {
    let config = super::load(paths)?;
    let bot = ChatBot::from_paths(config, paths)?;

    println!(
        "ModelChat v{} | User: {}{}\n",
        env!("CARGO_PKG_VERSION"),
        args.user,
        args.group
            .as_deref()
            .map(|g| format!(" | Group: {}", g))
            .unwrap_or_default()
    );
    println!("Type #menu for bot commands, #start_chat to talk without a prefix.");
    println!("/image <path or url> attaches an image to the next message, /quit exits.\n");

    let mut rl = DefaultEditor::new()?;
    let mut pending_image: Option<String> = None;

    loop {
        let readline = rl.readline("You: ");

        let input = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                break; // Ctrl+D
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        };

        let input = input.trim();
        if input.is_empty() && pending_image.is_none() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        match input.split_once(' ').map_or((input, ""), |(c, a)| (c, a.trim())) {
            ("/quit" | "/exit" | "/q", _) => break,
            ("/image", "") => {
                println!("Usage: /image <path or url>\n");
                continue;
            }
            ("/image", target) => {
                let target = shellexpand::tilde(target).into_owned();
                println!("Image attached: {}\n", target);
                pending_image = Some(target);
                continue;
            }
            _ => {}
        }

        let mut message = InboundMessage::text(&args.user, input);
        if let Some(group) = &args.group {
            message = message.in_group(group);
        }
        if let Some(image) = pending_image.take() {
            message = message.with_image(image);
        }

        match bot.handle(&message).await {
            Some(reply) => println!("\nBot: {}\n", reply),
            None => println!("(not a command; use #chat <message> or #start_chat)\n"),
        }
    }

    Ok(())
}
