//! Tolerant tool-call extraction from model replies.
//!
//! Models emit tool calls in several shapes and none of them reliably.
//! Extraction runs three stages, cheapest first:
//!
//! 1. the whole reply is a JSON object carrying a `tool_calls` (or `tools`)
//!    array, including the OpenAI `{"function": {...}}` item shape;
//! 2. `<toolcall>...</toolcall>` delimited blocks, parsed as strict JSON
//!    first and then with single-quote and trailing-comma relaxation;
//! 3. when exactly one delimited block survives stage 2 because free text
//!    bled into it, a quote-aware brace scan pulls out the first balanced
//!    object after the opening tag.
//!
//! Blocks that cannot be parsed at all stay in the reply verbatim. Tool
//! names are trimmed and case-folded here but validated at the call site;
//! oversized argument objects are replaced with `{}`.

use std::sync::LazyLock;

use ratchet_core::ToolCall;
use regex_lite::{Captures, Regex};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Serialized-size ceiling for an argument object, in bytes.
pub const MAX_ARGS_BYTES: usize = 2_000;

/// Tool names the runtime will accept: `segment` or `segment.segment`,
/// lowercase alphanumerics plus `.`, `_`, `-`, at most 64 chars.
static RE_TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._-]{1,64}$").expect("tool name regex"));

static RE_TOOLCALL_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<toolcall>(.*?)</toolcall>").expect("toolcall regex"));

static RE_BARE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*([a-z0-9._-]{1,64})\s*\((.*)\)\s*$").expect("bare call regex"));

pub fn is_valid_tool_name(name: &str) -> bool {
    RE_TOOL_NAME.is_match(name)
}

/// Replace an argument object with `{}` when its serialized form exceeds
/// [`MAX_ARGS_BYTES`]. Applied at every ingestion point so downstream code
/// never sees unbounded args.
pub fn clamp_args(args: Map<String, Value>) -> Map<String, Value> {
    let size = serde_json::to_string(&Value::Object(args.clone()))
        .map(|s| s.len())
        .unwrap_or(usize::MAX);
    if size > MAX_ARGS_BYTES { Map::new() } else { args }
}

/// Extract tool calls from a model reply.
///
/// Returns the reply text with recognized call blocks removed, plus the
/// calls in the order they appeared.
pub fn parse_tool_calls(content: &str) -> (String, Vec<ToolCall>) {
    let mut calls = Vec::new();

    // Stage 1: the entire reply is a structured object.
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(content) {
        let items = obj
            .get("tool_calls")
            .and_then(Value::as_array)
            .or_else(|| obj.get("tools").and_then(Value::as_array));
        if let Some(items) = items {
            for item in items {
                if let Some(call) = call_from_item(item) {
                    calls.push(call);
                }
            }
            let remaining = obj
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim()
                .to_string();
            return (remaining, calls);
        }
    }

    // Stage 2: delimited blocks. Parsed blocks are removed from the text;
    // unparseable ones are left in place verbatim.
    let mut cleaned = RE_TOOLCALL_BLOCK
        .replace_all(content, |caps: &Captures| match call_from_block(&caps[1]) {
            Some(call) => {
                calls.push(call);
                String::new()
            }
            None => caps[0].to_string(),
        })
        .into_owned();

    // Stage 3: one dangling block, typically an opener followed by free
    // text around the object. Scan for the first balanced object after it.
    if cleaned.matches("<toolcall>").count() == 1
        && let Some(start) = cleaned.find("<toolcall>")
    {
        let rest = &cleaned[start + "<toolcall>".len()..];
        if let Some((obj_start, obj_end)) = balanced_object(rest)
            && let Some(call) = call_from_block(&rest[obj_start..obj_end])
        {
            calls.push(call);
            cleaned = format!("{}{}", &cleaned[..start], &rest[obj_end..]);
        }
    }

    (cleaned.trim().to_string(), calls)
}

/// Parse the `name(args)` fallback shape, where `args` is either a JSON
/// object or a bare `"key": value` list. Only used when a reply contains
/// no other calls and consists of nothing but the invocation.
pub fn parse_bare_call(text: &str) -> Option<ToolCall> {
    let caps = RE_BARE_CALL.captures(text)?;
    let name = caps[1].trim().to_lowercase();
    let inner = caps[2].trim();

    let args = if inner.is_empty() {
        Map::new()
    } else {
        let candidate = if inner.starts_with('{') {
            inner.to_string()
        } else {
            format!("{{{inner}}}")
        };
        match parse_json_relaxed(&candidate) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    };

    Some(ToolCall::new(
        name,
        clamp_args(args),
        Uuid::new_v4().to_string(),
    ))
}

/// Build a call from a stage-1 array item, accepting both the flat
/// `{"name", "args"}` shape and the OpenAI `{"function": {"name",
/// "arguments"}}` shape (arguments may be a JSON-encoded string).
fn call_from_item(item: &Value) -> Option<ToolCall> {
    let obj = item.as_object()?;

    let (name, args) = if let Some(func) = obj.get("function").and_then(Value::as_object) {
        let name = func.get("name").and_then(Value::as_str).unwrap_or("");
        let args = match func.get("arguments") {
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        (name.to_string(), args)
    } else {
        let name = obj.get("name").and_then(Value::as_str).unwrap_or("");
        let args = obj
            .get("args")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        (name.to_string(), args)
    };

    Some(ToolCall::new(
        name.trim().to_lowercase(),
        clamp_args(args),
        id_of(obj),
    ))
}

/// Parse one delimited block body. `None` leaves the block verbatim.
fn call_from_block(body: &str) -> Option<ToolCall> {
    let Value::Object(obj) = parse_json_relaxed(body.trim())? else {
        return None;
    };
    let name = obj
        .get("name")
        .and_then(Value::as_str)?
        .trim()
        .to_lowercase();
    let args = obj
        .get("args")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Some(ToolCall::new(name, clamp_args(args), id_of(&obj)))
}

fn id_of(obj: &Map<String, Value>) -> String {
    match obj.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Strict JSON first, then a relaxed pass that rewrites single-quoted
/// strings to double-quoted ones and drops trailing commas.
fn parse_json_relaxed(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    serde_json::from_str(&strip_trailing_commas(&normalize_quotes(text))).ok()
}

fn normalize_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut delimiter: Option<char> = None;
    let mut escaped = false;
    for ch in text.chars() {
        match delimiter {
            Some(quote) => {
                if escaped {
                    out.push(ch);
                    escaped = false;
                } else if ch == '\\' {
                    out.push(ch);
                    escaped = true;
                } else if ch == quote {
                    out.push('"');
                    delimiter = None;
                } else if ch == '"' {
                    // a literal double quote inside a single-quoted string
                    out.push('\\');
                    out.push('"');
                } else {
                    out.push(ch);
                }
            }
            None => {
                if ch == '\'' || ch == '"' {
                    delimiter = Some(ch);
                    out.push('"');
                } else {
                    out.push(ch);
                }
            }
        }
    }
    out
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Byte range of the first balanced `{...}` in `text`, quote- and
/// escape-aware so braces inside string values do not count.
fn balanced_object(text: &str) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        return Some((start?, i + ch.len_utf8()));
                    }
                }
            }
            _ => {}
        }
    }
    None
}
