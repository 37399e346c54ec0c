//! Configuration loading for the ratchet runtime.
//!
//! Settings come from three layers, lowest priority first: built-in
//! defaults, an optional TOML file, and environment variables
//! (`RATCHET_*`, plus the conventional `LLM_*` backend variables).

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Runtime settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Restrictive operating mode: destructive tools are refused and only
    /// tools opted into safe mode may run.
    #[serde(default)]
    pub safe_mode: bool,

    /// Per-conversation tool-call budget.
    #[serde(default = "default_max_tools")]
    pub max_tools: u32,

    /// Transcript compaction window (messages).
    #[serde(default = "default_max_msgs")]
    pub max_msgs: usize,

    /// Sanitizer character cap for tool results.
    #[serde(default = "default_result_chars")]
    pub max_tool_result_chars: usize,

    /// Sanitizer token cap for tool results.
    #[serde(default = "default_result_tokens")]
    pub max_tool_result_tokens: usize,

    /// Character cap for logged result previews.
    #[serde(default = "default_log_chars")]
    pub max_log_chars: usize,

    /// Model backend endpoint (OpenAI-compatible chat completions URL).
    #[serde(default)]
    pub endpoint: String,

    /// Model identifier sent to the backend.
    #[serde(default)]
    pub model: String,

    /// Backend API key, sent as a bearer token when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token cap per model call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tools() -> u32 {
    3
}
fn default_max_msgs() -> usize {
    20
}
fn default_result_chars() -> usize {
    1_000
}
fn default_result_tokens() -> usize {
    512
}
fn default_log_chars() -> usize {
    400
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    256
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            safe_mode: false,
            max_tools: default_max_tools(),
            max_msgs: default_max_msgs(),
            max_tool_result_chars: default_result_chars(),
            max_tool_result_tokens: default_result_tokens(),
            max_log_chars: default_log_chars(),
            endpoint: String::new(),
            model: String::new(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("safe_mode", &self.safe_mode)
            .field("max_tools", &self.max_tools)
            .field("max_msgs", &self.max_msgs)
            .field("max_tool_result_chars", &self.max_tool_result_chars)
            .field("max_tool_result_tokens", &self.max_tool_result_tokens)
            .field("max_log_chars", &self.max_log_chars)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Settings {
    /// Load settings: defaults, then an optional TOML file, then env vars.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(p) if p.exists() => {
                debug!(path = %p.display(), "loading config file");
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)?
            }
            _ => Settings::default(),
        };
        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay environment variables onto the current values.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("RATCHET_SAFE_MODE") {
            self.safe_mode = matches!(v.trim(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("RATCHET_MAX_TOOLS")
            && let Ok(n) = v.trim().parse()
        {
            self.max_tools = n;
        }
        if let Ok(v) = std::env::var("LLM_ENDPOINT") {
            self.endpoint = v.trim().to_string();
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            self.model = v.trim().to_string();
        }
        if let Ok(v) = std::env::var("LLM_API_KEY")
            && !v.trim().is_empty()
        {
            self.api_key = Some(v.trim().to_string());
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_msgs < 3 {
            return Err(ConfigError::Invalid(
                "max_msgs must be at least 3 (marker + task + reply)".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(
                "temperature must be within 0.0..=2.0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.max_tools, 3);
        assert_eq!(s.max_msgs, 20);
        assert_eq!(s.max_tool_result_chars, 1_000);
        assert_eq!(s.max_tool_result_tokens, 512);
        assert!(!s.safe_mode);
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "safe_mode = true\nmax_tools = 5\nmodel = \"test-model\"").unwrap();

        let s = Settings::load(Some(file.path())).unwrap();
        assert!(s.safe_mode);
        assert_eq!(s.max_tools, 5);
        assert_eq!(s.model, "test-model");
        // untouched fields keep defaults
        assert_eq!(s.max_msgs, 20);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let s = Settings::load(Some(Path::new("/nonexistent/ratchet.toml"))).unwrap();
        assert_eq!(s.max_tools, 3);
    }

    #[test]
    fn rejects_invalid_window() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_msgs = 1").unwrap();
        assert!(matches!(
            Settings::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn debug_redacts_api_key() {
        let s = Settings {
            api_key: Some("sk-very-secret".into()),
            ..Settings::default()
        };
        let rendered = format!("{s:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
