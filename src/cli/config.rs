use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;

use modelchat::config::Config;
use modelchat::paths::Paths;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration (secrets masked)
    Show {
        /// Output format: yaml (default) or json
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Get a configuration value
    Get {
        /// Config key (e.g., console.port)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Config key (e.g., memory_length or console.port)
        key: String,

        /// Value to set, parsed as YAML
        value: String,
    },

    /// Show config file path
    Path,

    /// Initialize default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn run(args: ConfigArgs, paths: &Paths) -> Result<()> {
    match args.command {
        ConfigCommands::Show { format } => show_config(paths, &format),
        ConfigCommands::Get { key } => get_config(paths, &key),
        ConfigCommands::Set { key, value } => set_config(paths, &key, &value),
        ConfigCommands::Path => {
            println!("{}", paths.config_file().display());
            Ok(())
        }
        ConfigCommands::Init { force } => init_config(paths, force),
    }
}

fn show_config(paths: &Paths, format: &str) -> Result<()> {
    let view = Config::load(paths)?.redacted();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&view)?),
        _ => print!("{}", serde_yaml::to_string(&view)?),
    }

    Ok(())
}

fn get_config(paths: &Paths, key: &str) -> Result<()> {
    let view = Config::load(paths)?.redacted();
    let value = lookup(&view, key).with_context(|| format!("Unknown config key: {}", key))?;
    match value {
        Value::String(s) => println!("{}", s),
        other => println!("{}", other),
    }
    Ok(())
}

fn set_config(paths: &Paths, key: &str, value: &str) -> Result<()> {
    let config = super::load(paths)?;
    let parsed: Value = serde_yaml::from_str(value)
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;

    let current = serde_json::to_value(config.snapshot())?;
    config.patch(&nest(&current, key, parsed)?)?;

    println!("Set {} = {}", key, value);
    Ok(())
}

fn init_config(paths: &Paths, force: bool) -> Result<()> {
    let path = paths.config_file();

    if path.exists() {
        if !force {
            anyhow::bail!(
                "Config file already exists at {}. Use --force to overwrite.",
                path.display()
            );
        }
        std::fs::remove_file(&path)?;
    }

    Config::init_template(&path)?;
    println!("Created config file at {}", path.display());
    Ok(())
}

fn lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(value, |v, part| v.get(part))
}

/// Top-level patch setting the dotted `key`, keeping sibling keys of nested
/// sections.
fn nest(current: &Value, key: &str, value: Value) -> Result<Value> {
    let (head, rest) = match key.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (key, None),
    };
    let inner = match rest {
        None => value,
        Some(rest) => {
            let section = current.get(head).cloned().unwrap_or(Value::Object(Default::default()));
            let nested = nest(&section, rest, value)?;
            let mut merged = match section {
                Value::Object(map) => map,
                _ => Default::default(),
            };
            if let Value::Object(updates) = nested {
                merged.extend(updates);
            }
            Value::Object(merged)
        }
    };
    let mut patch = serde_json::Map::new();
    patch.insert(head.to_string(), inner);
    Ok(Value::Object(patch))
}
