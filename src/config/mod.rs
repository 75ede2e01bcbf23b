use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::info;

use crate::paths::Paths;
use crate::store::{with_file_lock, write_atomic};

/// Value the console shows in place of a secret. Patches carrying it leave
/// the stored secret alone.
pub const REDACTED: &str = "********";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cloud chat endpoint credentials (`${VAR}` expanded on load)
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub model_temperature: f64,

    /// Vision endpoint; each unset field falls back to the chat endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_base_url: Option<String>,

    /// Route chat turns to a local Ollama server instead of the cloud endpoint
    #[serde(default)]
    pub use_local_model: bool,

    #[serde(default = "default_local_model")]
    pub local_model: String,

    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,

    #[serde(default = "default_true")]
    pub enable_vision: bool,

    /// Tool-augmented backend backed by servers in mcp_config.json
    #[serde(default)]
    pub enable_mcp: bool,

    #[serde(default = "default_true")]
    pub enable_continuous_session: bool,

    /// Maximum turns retained per user
    #[serde(default = "default_memory_length")]
    pub memory_length: usize,

    /// Literal substrings stripped from every reply
    #[serde(default)]
    pub cleanup_chars: Vec<String>,

    /// Super-admin id
    #[serde(default, deserialize_with = "id_string")]
    pub root: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound on model/tool round trips within one turn
    #[serde(default = "default_max_tool_hops")]
    pub max_tool_hops: usize,

    #[serde(default)]
    pub console: ConsoleConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Only user ids inside this range are listed by the sessions endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_user_range: Option<UserRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRange {
    pub min: u64,
    pub max: u64,
}

impl UserRange {
    /// Non-numeric ids never match.
    pub fn contains(&self, user_id: &str) -> bool {
        user_id
            .parse::<u64>()
            .map(|id| id >= self.min && id <= self.max)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub api_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Resolved model endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.6
}
fn default_local_model() -> String {
    "llama3".to_string()
}
fn default_local_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_true() -> bool {
    true
}
fn default_memory_length() -> usize {
    10
}
fn default_request_timeout() -> u64 {
    60
}
fn default_max_tool_hops() -> usize {
    10
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Accept both `root: 12345` and `root: "12345"`.
fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Text(s)) => s.trim().to_string(),
        Some(RawId::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            model_temperature: default_temperature(),
            vision_model: None,
            vision_api_key: None,
            vision_base_url: None,
            use_local_model: false,
            local_model: default_local_model(),
            local_base_url: default_local_base_url(),
            enable_vision: true,
            enable_mcp: false,
            enable_continuous_session: true,
            memory_length: default_memory_length(),
            cleanup_chars: Vec::new(),
            root: String::new(),
            request_timeout_secs: default_request_timeout(),
            max_tool_hops: default_max_tool_hops(),
            console: ConsoleConfig::default(),
            telegram: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
            port: default_port(),
            session_user_range: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the resolved plugin directory. A missing file yields defaults.
    pub fn load(paths: &Paths) -> Result<Self> {
        Self::load_from(&paths.config_file())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        config.expand_env_vars();
        Ok(config)
    }

    /// Parse YAML text. An empty document is treated as all defaults.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        if value.is_null() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_value(value)?)
    }

    /// Write the commented template unless a config already exists.
    pub fn init_template(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
        info!("Created default config at {}", path.display());
        Ok(true)
    }

    fn expand_env_vars(&mut self) {
        self.api_key = expand_env(&self.api_key);
        if let Some(ref mut key) = self.vision_api_key {
            *key = expand_env(key);
        }
        if let Some(ref mut telegram) = self.telegram {
            telegram.api_token = expand_env(&telegram.api_token);
        }
    }

    pub fn chat_endpoint(&self) -> Endpoint {
        Endpoint {
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
        }
    }

    pub fn vision_endpoint(&self) -> Endpoint {
        Endpoint {
            model: non_empty(&self.vision_model).unwrap_or_else(|| self.model.clone()),
            api_key: non_empty(&self.vision_api_key).unwrap_or_else(|| self.api_key.clone()),
            base_url: non_empty(&self.vision_base_url).unwrap_or_else(|| self.base_url.clone()),
        }
    }

    pub fn is_super_admin(&self, user_id: &str) -> bool {
        !self.root.is_empty() && self.root == user_id
    }

    /// JSON view with credentials masked, for the admin console.
    pub fn redacted(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(map) = value.as_object_mut() {
            for key in ["api_key", "vision_api_key"] {
                if let Some(v) = map.get_mut(key) {
                    *v = serde_json::Value::String(mask(v.as_str().unwrap_or_default()));
                }
            }
            if let Some(telegram) = map.get_mut("telegram").and_then(|t| t.as_object_mut())
                && let Some(v) = telegram.get_mut("api_token")
            {
                *v = serde_json::Value::String(mask(v.as_str().unwrap_or_default()));
            }
        }
        value
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        REDACTED.to_string()
    }
}

fn expand_env(s: &str) -> String {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else if let Some(var_name) = s.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else {
        s.to_string()
    }
}

/// Live configuration shared by the bot, the console and the CLI.
///
/// Feature toggles are read through [`SharedConfig::snapshot`] on every turn,
/// so a console patch takes effect without restarting.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
    path: Option<PathBuf>,
    patching: Arc<Mutex<()>>,
}

impl SharedConfig {
    /// File-backed config; `patch` rewrites `path`.
    pub fn new(config: Config, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path: Some(path.into()),
            patching: Arc::default(),
        }
    }

    /// In-memory config; `patch` only swaps the live copy.
    pub fn in_memory(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path: None,
            patching: Arc::default(),
        }
    }

    pub fn load(paths: &Paths) -> Result<Self> {
        let config = Config::load(paths)?;
        Ok(Self::new(config, paths.config_file()))
    }

    pub fn snapshot(&self) -> Config {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Merge `patch` into the stored YAML mapping.
    ///
    /// Nested objects merge key by key and [`REDACTED`] values are skipped.
    /// The merged document must deserialize into a [`Config`]; otherwise
    /// nothing is written and the live copy is untouched. Comments in the
    /// YAML file are not preserved.
    pub fn patch(&self, patch: &serde_json::Value) -> Result<Config> {
        let serde_json::Value::Object(updates) = patch else {
            anyhow::bail!("Config patch must be a JSON object");
        };

        let _patching = self.patching.lock().unwrap_or_else(PoisonError::into_inner);
        match &self.path {
            Some(path) => with_file_lock(&path.with_extension("lock"), || {
                self.patch_file(path, updates)
            }),
            None => {
                let mut document = serde_yaml::to_value(self.snapshot())?;
                let merged = merge_document(&mut document, updates)?;
                self.swap(merged, updates.len())
            }
        }
    }

    fn patch_file(
        &self,
        path: &Path,
        updates: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Config> {
        // Start from the file, not the live copy, so `${VAR}` references
        // stay unexpanded on disk.
        let mut document = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        } else {
            serde_yaml::Value::Null
        };
        if document.is_null() {
            document = serde_yaml::Value::Mapping(Default::default());
        }

        let merged = merge_document(&mut document, updates)?;
        write_atomic(path, serde_yaml::to_string(&document)?.as_bytes())?;
        self.swap(merged, updates.len())
    }

    fn swap(&self, mut merged: Config, keys: usize) -> Result<Config> {
        merged.expand_env_vars();
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = merged.clone();
        info!(keys, "Config patched");
        Ok(merged)
    }
}

/// Apply `updates` to `document` and validate the result.
fn merge_document(
    document: &mut serde_yaml::Value,
    updates: &serde_json::Map<String, serde_json::Value>,
) -> Result<Config> {
    let serde_yaml::Value::Mapping(mapping) = document else {
        anyhow::bail!("Config file is not a YAML mapping");
    };
    merge_mapping(mapping, updates)?;
    serde_yaml::from_value(document.clone()).context("Patched config is invalid")
}

fn merge_mapping(
    target: &mut serde_yaml::Mapping,
    updates: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    for (key, value) in updates {
        let key = serde_yaml::Value::String(key.clone());
        match value {
            serde_json::Value::String(s) if s == REDACTED => {}
            serde_json::Value::Object(nested) => {
                if let Some(serde_yaml::Value::Mapping(existing)) = target.get_mut(&key) {
                    merge_mapping(existing, nested)?;
                } else {
                    let mut fresh = serde_yaml::Mapping::new();
                    merge_mapping(&mut fresh, nested)?;
                    target.insert(key, serde_yaml::Value::Mapping(fresh));
                }
            }
            _ => {
                target.insert(key, serde_yaml::to_value(value)?);
            }
        }
    }
    Ok(())
}

/// Default config template with comments (written by `config init`)
const DEFAULT_CONFIG_TEMPLATE: &str = r###"# ModelChat configuration

# Cloud chat endpoint (any OpenAI-compatible API)
api_key: "${OPENAI_API_KEY}"
base_url: "https://api.openai.com/v1"
model: "gpt-4o-mini"
model_temperature: 0.6

# Vision endpoint; unset keys fall back to the chat endpoint
# vision_model: "gpt-4o"
# vision_api_key: "${OPENAI_API_KEY}"
# vision_base_url: "https://api.openai.com/v1"

# Local Ollama backend
use_local_model: false
local_model: "llama3"
local_base_url: "http://localhost:11434"

enable_vision: true
enable_mcp: false              # tool servers from mcp_config.json
enable_continuous_session: true

memory_length: 10              # turns kept per user
cleanup_chars: ["**", "##"]    # stripped from every reply

# Super-admin id
root: ""

request_timeout_secs: 60
max_tool_hops: 10

console:
  enabled: true
  bind: "127.0.0.1"
  port: 5000
  # session_user_range:
  #   min: 10000
  #   max: 99999999999

# telegram:
#   enabled: true
#   api_token: "${TELEGRAM_BOT_TOKEN}"

logging:
  level: "info"
"###;
