//! Two-stage truncation for tool results.
//!
//! Token truncation runs first (the coarser, cheaper bound), then the
//! character cap. Each stage appends an explicit marker so the model knows
//! material was dropped rather than silently losing it.

use regex_lite::Regex;
use std::sync::LazyLock;

static RE_WS_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{3,}").expect("whitespace pattern"));

/// Cap `text` by whitespace-token count, then by character count.
pub fn truncate(text: &str, char_limit: usize, token_limit: usize) -> String {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut out = if tokens.len() > token_limit {
        let removed = tokens.len() - token_limit;
        format!(
            "{}... [truncated {removed} tokens]",
            tokens[..token_limit].join(" ")
        )
    } else {
        text.to_string()
    };

    let chars = out.chars().count();
    if chars > char_limit {
        let head: String = out.chars().take(char_limit).collect();
        out = format!("{head}... [truncated {} chars]", chars - char_limit);
    }
    out
}

/// Collapse runs of three or more whitespace characters to two spaces.
pub fn collapse_whitespace(text: &str) -> String {
    RE_WS_RUN.replace_all(text, "  ").into_owned()
}
