//! Stateless redaction of sensitive substrings.
//!
//! Three families are masked before any tool output re-enters the model's
//! context: email addresses, Windows user-home path segments, and
//! credential-looking `key: value` / `key=value` pairs (the key survives,
//! the value is masked). Redaction is idempotent: the replacement text
//! never matches any of the patterns.

use regex_lite::{Captures, Regex};
use std::sync::LazyLock;

static RE_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern")
});

static RE_USERPATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)C:\\Users\\[^\\]+").expect("userpath pattern"));

static RE_CREDENTIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:api[_-]?key|token|secret)\s*[:=]\s*([A-Za-z0-9._-]{8,})")
        .expect("credential pattern")
});

/// Mask emails, user-home paths, and credential values.
pub fn redact(text: &str) -> String {
    let t = RE_EMAIL.replace_all(text, "[REDACTED_EMAIL]");
    let t = RE_USERPATH.replace_all(&t, r"C:\Users\<redacted>");
    let t = RE_CREDENTIAL.replace_all(&t, |caps: &Captures<'_>| {
        caps[0].replacen(&caps[1], "<redacted>", 1)
    });
    t.into_owned()
}
