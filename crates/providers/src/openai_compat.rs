//! OpenAI-compatible model backend.
//!
//! Works with any endpoint exposing `/chat/completions`: OpenAI, OpenRouter,
//! Ollama, vLLM, llama.cpp server, and friends. Non-streaming only; the
//! loop consumes whole turns.
//!
//! Requests retry with escalating per-attempt timeouts (60s, 90s, 120s) and
//! a jittered linear backoff between attempts. Only transient failures are
//! retried: network errors, timeouts, 429, and 5xx. Authentication failures
//! abort immediately.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use ratchet_config::Settings;
use ratchet_core::error::BackendError;
use ratchet_core::message::{Role, Transcript};
use ratchet_core::{GenerationParams, ModelBackend, ModelReply, ToolCall, Usage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Per-attempt request timeouts. The last entry is the final attempt.
const ATTEMPT_TIMEOUTS: [Duration; 3] = [
    Duration::from_secs(60),
    Duration::from_secs(90),
    Duration::from_secs(120),
];

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_JITTER_MS: u64 = 250;

/// A model backend speaking the OpenAI chat-completions dialect.
pub struct OpenAiCompatBackend {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, BackendError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let model = model.into();
        if endpoint.is_empty() {
            return Err(BackendError::NotConfigured("endpoint is empty".into()));
        }
        if model.is_empty() {
            return Err(BackendError::NotConfigured("model is empty".into()));
        }
        // per-attempt timeouts are set on each request, not the client
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(Self {
            endpoint,
            model,
            api_key,
            client,
        })
    }

    /// Build a backend from settings; requires `endpoint` and `model`.
    pub fn from_settings(settings: &Settings) -> Result<Self, BackendError> {
        Self::new(
            settings.endpoint.clone(),
            settings.model.clone(),
            settings.api_key.clone(),
        )
    }

    fn to_api_messages(transcript: &Transcript) -> Vec<ApiMessage> {
        transcript
            .messages()
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_call_id: m.tool_call_id.clone(),
                tool_calls: None,
            })
            .collect()
    }

    async fn attempt(
        &self,
        body: &Value,
        timeout: Duration,
    ) -> Result<ModelReply, BackendError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(e.to_string())
            } else {
                BackendError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(BackendError::AuthenticationFailed(
                "invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status_code: status,
                message,
            });
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| BackendError::Api {
            status_code: 200,
            message: format!("failed to parse response: {e}"),
        })?;
        reply_from_response(api_response)
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        transcript: &Transcript,
        params: &GenerationParams,
    ) -> Result<ModelReply, BackendError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(transcript),
            "stream": false,
        });
        if let Some(temperature) = params.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        let attempts = ATTEMPT_TIMEOUTS.len();
        let mut last_err = BackendError::NotConfigured("no attempts made".into());
        for (i, timeout) in ATTEMPT_TIMEOUTS.iter().enumerate() {
            debug!(model = %self.model, attempt = i + 1, timeout_secs = timeout.as_secs(), "model request");
            match self.attempt(&body, *timeout).await {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    if !is_retryable(&err) || i + 1 == attempts {
                        warn!(model = %self.model, attempt = i + 1, error = %err, "model request failed");
                        return Err(err);
                    }
                    warn!(model = %self.model, attempt = i + 1, error = %err, "model request failed, retrying");
                    last_err = err;
                    tokio::time::sleep(backoff_for(i + 1)).await;
                }
            }
        }
        Err(last_err)
    }
}

fn is_retryable(err: &BackendError) -> bool {
    match err {
        BackendError::Network(_) | BackendError::Timeout(_) => true,
        BackendError::Api { status_code, .. } => *status_code == 429 || *status_code >= 500,
        BackendError::AuthenticationFailed(_) | BackendError::NotConfigured(_) => false,
    }
}

fn backoff_for(attempt: usize) -> Duration {
    let jitter = rand::rng().random_range(0..BACKOFF_JITTER_MS);
    BACKOFF_BASE * attempt as u32 + Duration::from_millis(jitter)
}

fn reply_from_response(response: ApiResponse) -> Result<ModelReply, BackendError> {
    let choice = response.choices.into_iter().next().ok_or(BackendError::Api {
        status_code: 200,
        message: "no choices in response".into(),
    })?;

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let args = match serde_json::from_str::<Value>(&tc.function.arguments) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };
            ToolCall::new(tc.function.name, args, tc.id)
        })
        .collect();

    Ok(ModelReply {
        text: choice.message.content.unwrap_or_default(),
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        usage: response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }),
    })
}

// --- wire types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratchet_core::message::ChatMessage;

    #[test]
    fn rejects_missing_endpoint() {
        assert!(matches!(
            OpenAiCompatBackend::new("", "m", None),
            Err(BackendError::NotConfigured(_))
        ));
    }

    #[test]
    fn strips_trailing_slash_from_endpoint() {
        let backend = OpenAiCompatBackend::new("http://localhost:8080/v1/", "m", None).unwrap();
        assert_eq!(backend.endpoint, "http://localhost:8080/v1");
    }

    #[test]
    fn transcript_conversion_keeps_roles_and_call_ids() {
        let mut t = Transcript::new();
        t.push(ChatMessage::system("[remaining_tools=3]"));
        t.push(ChatMessage::user("hello"));
        t.push(ChatMessage::tool("fs.read", "call_9", "{\"kind\":\"ok\"}"));

        let api = OpenAiCompatBackend::to_api_messages(&t);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "tool");
        assert_eq!(api[2].tool_call_id.as_deref(), Some("call_9"));
    }

    #[test]
    fn parses_plain_completion() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}],
            "usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"#;
        let response: ApiResponse = serde_json::from_str(raw).unwrap();
        let reply = reply_from_response(response).unwrap();
        assert_eq!(reply.text, "hi");
        assert!(reply.tool_calls.is_none());
        assert_eq!(reply.usage.unwrap().completion_tokens, 3);
    }

    #[test]
    fn parses_native_tool_calls() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":null,
            "tool_calls":[{"id":"call_1","type":"function",
            "function":{"name":"fs.list","arguments":"{\"path\":\".\"}"}}]}}]}"#;
        let response: ApiResponse = serde_json::from_str(raw).unwrap();
        let reply = reply_from_response(response).unwrap();
        assert_eq!(reply.text, "");
        let calls = reply.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "fs.list");
        assert_eq!(calls[0].args.get("path"), Some(&Value::from(".")));
        assert_eq!(calls[0].id, "call_1");
    }

    #[test]
    fn malformed_arguments_become_empty_object() {
        let raw = r#"{"choices":[{"message":{"role":"assistant",
            "tool_calls":[{"id":"c","function":{"name":"t","arguments":"not json"}}]}}]}"#;
        let response: ApiResponse = serde_json::from_str(raw).unwrap();
        let reply = reply_from_response(response).unwrap();
        assert!(reply.tool_calls.unwrap()[0].args.is_empty());
    }

    #[test]
    fn empty_choices_is_an_api_error() {
        let response: ApiResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            reply_from_response(response),
            Err(BackendError::Api { .. })
        ));
    }

    #[test]
    fn retry_classification() {
        assert!(is_retryable(&BackendError::Network("reset".into())));
        assert!(is_retryable(&BackendError::Timeout("deadline".into())));
        assert!(is_retryable(&BackendError::Api {
            status_code: 429,
            message: String::new()
        }));
        assert!(is_retryable(&BackendError::Api {
            status_code: 503,
            message: String::new()
        }));
        assert!(!is_retryable(&BackendError::Api {
            status_code: 400,
            message: String::new()
        }));
        assert!(!is_retryable(&BackendError::AuthenticationFailed(
            "bad key".into()
        )));
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let first = backoff_for(1);
        let second = backoff_for(2);
        assert!(first >= Duration::from_millis(500));
        assert!(first < Duration::from_millis(500 + BACKOFF_JITTER_MS));
        assert!(second >= Duration::from_millis(1_000));
    }
}
