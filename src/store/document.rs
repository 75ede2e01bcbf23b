use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant";

/// The persisted moderation + admin + prompt aggregate (`data.json`).
///
/// Keys this version does not know about are kept in `extra` and written
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDocument {
    #[serde(default, deserialize_with = "id_list")]
    pub banned_groups: Vec<String>,

    #[serde(default, deserialize_with = "id_list")]
    pub banned_users: Vec<String>,

    #[serde(default)]
    pub blocked_words: Vec<String>,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default, deserialize_with = "id_list")]
    pub admins: Vec<String>,

    /// Output-filter words managed by the super-admin
    #[serde(default)]
    pub cleanup_chars: Vec<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for DataDocument {
    fn default() -> Self {
        Self {
            banned_groups: Vec::new(),
            banned_users: Vec::new(),
            blocked_words: Vec::new(),
            system_prompt: default_system_prompt(),
            admins: Vec::new(),
            cleanup_chars: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Ids may have been written as JSON numbers by older tooling.
fn id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

/// Insert `value` unless present. Returns whether the list changed.
pub(crate) fn insert_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

/// Remove every occurrence of `value`. Returns whether the list changed.
pub(crate) fn remove_value(list: &mut Vec<String>, value: &str) -> bool {
    let before = list.len();
    list.retain(|v| v != value);
    list.len() != before
}
