//! The uniform tool result envelope.
//!
//! Every tool outcome — success or failure, produced by the tool itself or
//! by the dispatcher on its behalf — is normalized into this tagged union
//! before anything else sees it. The agent loop never inspects a tool's
//! native return type.

use serde::{Deserialize, Serialize};

/// Error classification shared by the dispatcher, the registry policy gate,
/// and the conversation loop's validation feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unknown tool name at dispatch time
    NotFound,
    /// Safe-mode policy block at dispatch time
    Forbidden,
    /// Destructive-class block surfaced directly in conversation
    ForbiddenInSafeMode,
    /// Tool not opted into safe mode, surfaced in conversation
    DisabledInSafeMode,
    /// Token bucket exhausted
    RateLimit,
    /// Execution exceeded the tool's declared budget
    Timeout,
    /// Argument shape/type mismatch detected at execution time
    BadArgs,
    /// Required arguments absent (schema validation, pre-dispatch)
    MissingArgs,
    /// Argument type or range violation (schema validation, pre-dispatch)
    InvalidType,
    /// Unexpected failure inside a tool
    ToolError,
    /// Unexpected failure inside the runtime (including tool panics)
    Internal,
    /// Tool name did not resolve — surfaced to the model as feedback
    UnknownTool,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::ForbiddenInSafeMode => "forbidden_in_safe_mode",
            ErrorCode::DisabledInSafeMode => "disabled_in_safe_mode",
            ErrorCode::RateLimit => "rate_limit",
            ErrorCode::Timeout => "timeout",
            ErrorCode::BadArgs => "bad_args",
            ErrorCode::MissingArgs => "missing_args",
            ErrorCode::InvalidType => "invalid_type",
            ErrorCode::ToolError => "tool_error",
            ErrorCode::Internal => "internal",
            ErrorCode::UnknownTool => "unknown_tool",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `Ok{result} | Error{code, message, hint}` union every tool and the
/// dispatcher honor. Serializes to the compact JSON that lands in tool
/// messages: `{"kind":"ok","result":…}` / `{"kind":"error","code":…,…}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Envelope {
    Ok {
        #[serde(default)]
        result: serde_json::Value,
    },
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        hint: String,
        /// Populated by the dispatcher for timeouts
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elapsed_ms: Option<u64>,
    },
}

impl Envelope {
    pub fn ok(result: impl Into<serde_json::Value>) -> Self {
        Envelope::Ok {
            result: result.into(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Envelope::Error {
            code,
            message: message.into(),
            hint: String::new(),
            elapsed_ms: None,
        }
    }

    pub fn error_with_hint(
        code: ErrorCode,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Envelope::Error {
            code,
            message: message.into(),
            hint: hint.into(),
            elapsed_ms: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Envelope::Ok { .. })
    }

    /// The outcome label for metrics: `ok` for successes, the error code
    /// otherwise.
    pub fn outcome(&self) -> &'static str {
        match self {
            Envelope::Ok { .. } => "ok",
            Envelope::Error { code, .. } => code.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_envelope_wire_shape() {
        let env = Envelope::ok(json!({"names": ["a", "b"]}));
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire["kind"], "ok");
        assert_eq!(wire["result"]["names"][0], "a");
    }

    #[test]
    fn error_envelope_wire_shape() {
        let env = Envelope::error_with_hint(
            ErrorCode::RateLimit,
            "rate limit exceeded",
            "wait before retrying",
        );
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire["kind"], "error");
        assert_eq!(wire["code"], "rate_limit");
        assert_eq!(wire["hint"], "wait before retrying");
        assert!(wire.get("elapsed_ms").is_none());
    }

    #[test]
    fn empty_hint_is_omitted() {
        let wire = serde_json::to_value(Envelope::error(ErrorCode::NotFound, "tool not found"))
            .unwrap();
        assert!(wire.get("hint").is_none());
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(Envelope::ok(json!(1)).outcome(), "ok");
        assert_eq!(
            Envelope::error(ErrorCode::Timeout, "tool timed out").outcome(),
            "timeout"
        );
    }

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::error(ErrorCode::BadArgs, "missing parameter");
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }
}
