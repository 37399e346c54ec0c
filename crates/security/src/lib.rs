//! # ratchet-security
//!
//! Output sanitization for text destined for the model's context: stateless
//! redaction of obviously sensitive substrings, and two-stage truncation
//! that keeps tool results bounded.
//!
//! Everything here is pure string-to-string; callers decide limits.

pub mod redact;
pub mod truncate;

pub use redact::redact;
pub use truncate::truncate;

/// Default character cap for a sanitized tool result.
pub const DEFAULT_CHAR_LIMIT: usize = 1_000;

/// Default whitespace-token cap for a sanitized tool result.
pub const DEFAULT_TOKEN_LIMIT: usize = 512;

/// Redact, truncate, and collapse long whitespace runs.
///
/// This is the composition applied to every tool envelope before it is
/// appended to the transcript.
pub fn sanitize(text: &str, char_limit: usize, token_limit: usize) -> String {
    let out = truncate(&redact(text), char_limit, token_limit);
    truncate::collapse_whitespace(&out)
}
