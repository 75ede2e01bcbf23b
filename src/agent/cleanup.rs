//! Reply post-processing shared by the chat and vision paths.

use once_cell::sync::Lazy;
use regex::Regex;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));

/// Strip `filters` literally, drop `<think>` blocks, collapse blank lines
/// and trim.
pub fn clean_reply(text: &str, filters: &[String]) -> String {
    let mut out = THINK_BLOCK.replace_all(text, "").into_owned();

    for filter in filters.iter().filter(|f| !f.is_empty()) {
        out = out.replace(filter.as_str(), "");
    }

    BLANK_RUNS.replace_all(&out, "\n").trim().to_string()
}
