//! Plugin directory resolution.
//!
//! Every persisted file lives under one plugin directory, resolved through:
//! 1. `MODELCHAT_DIR` env var (absolute, `~` expanded)
//! 2. XDG data dir via `etcetera` (`~/.local/share/modelchat`)
//!
//! Relative overrides are ignored, the same way XDG variables are.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Resolved locations of every file the bot reads or writes.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Plugin directory: config.yml, data.json, mcp_config.json
    pub plugin_dir: PathBuf,

    /// Cache directory: conversation history
    pub cache_dir: PathBuf,
}

impl Paths {
    /// Resolve all paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let plugin_dir = match plugin_dir_override(&env_fn) {
            Some(dir) => dir,
            None => {
                let strategy = etcetera::choose_base_strategy()
                    .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;
                strategy.data_dir().join("modelchat")
            }
        };

        Ok(Self::at(plugin_dir))
    }

    /// Paths rooted at an explicit plugin directory.
    pub fn at(plugin_dir: impl Into<PathBuf>) -> Self {
        let plugin_dir = plugin_dir.into();
        let cache_dir = plugin_dir.join("cache");
        Self {
            plugin_dir,
            cache_dir,
        }
    }

    /// YAML configuration: plugin_dir/config.yml
    pub fn config_file(&self) -> PathBuf {
        self.plugin_dir.join("config.yml")
    }

    /// Moderation, admins and system prompt: plugin_dir/data.json
    pub fn data_file(&self) -> PathBuf {
        self.plugin_dir.join("data.json")
    }

    /// Advisory lock guarding data.json across processes
    pub fn data_lock(&self) -> PathBuf {
        self.plugin_dir.join("data.lock")
    }

    /// Conversation history: cache_dir/history.json
    pub fn history_file(&self) -> PathBuf {
        self.cache_dir.join("history.json")
    }

    /// Tool server registrations: plugin_dir/mcp_config.json
    pub fn mcp_config_file(&self) -> PathBuf {
        self.plugin_dir.join("mcp_config.json")
    }

    /// Create the plugin and cache directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.plugin_dir, &self.cache_dir] {
            create_dir(dir)?;
        }
        Ok(())
    }
}

fn plugin_dir_override<F>(env_fn: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    let raw = env_fn("MODELCHAT_DIR").ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = shellexpand::tilde(trimmed);
    let path = PathBuf::from(expanded.to_string());
    path.is_absolute().then_some(path)
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))
}
