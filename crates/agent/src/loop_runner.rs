//! The turn-based conversation loop.
//!
//! One `chat` call owns one conversation: it alternates model calls and
//! tool dispatches until the model answers without tools, the per-chat
//! tool budget runs out, or the circuit breaker trips on three
//! consecutive failures of the same tool. All mutable state is local to
//! the call, so one `Agent` can serve concurrent conversations.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use ratchet_config::Settings;
use ratchet_core::message::{ChatMessage, Transcript};
use ratchet_core::tool::{ToolRegistry, violates_policy};
use ratchet_core::{Envelope, Error, GenerationParams, ModelBackend, ModelReply, ToolCall};
use ratchet_dispatch::Dispatcher;
use ratchet_security::sanitize;
use ratchet_telemetry::Metrics;
use regex_lite::Regex;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::parser;

/// Consecutive failures of the same tool before the loop gives up.
pub const FAILURE_STREAK_LIMIT: u32 = 3;

/// Fixed reply returned when the circuit breaker trips.
pub const CIRCUIT_BREAKER_REPLY: &str = "I hit repeated tool failures and stopped \
retrying. Here's what I found so far; you may want to rephrase the request or try \
again later.";

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

static RE_TRAILING_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\n").expect("whitespace regex"));

/// Tool-using conversation driver.
pub struct Agent {
    backend: Arc<dyn ModelBackend>,
    registry: Arc<ToolRegistry>,
    dispatcher: Dispatcher,
    metrics: Arc<Metrics>,
    safe_mode: bool,
    max_tools: u32,
    max_msgs: usize,
    result_char_limit: usize,
    result_token_limit: usize,
    log_preview_chars: usize,
    temperature: f32,
    max_tokens: u32,
    dry_run: bool,
}

impl Agent {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        registry: Arc<ToolRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let defaults = Settings::default();
        Self {
            backend,
            dispatcher: Dispatcher::new(Arc::clone(&registry), Arc::clone(&metrics)),
            registry,
            metrics,
            safe_mode: defaults.safe_mode,
            max_tools: defaults.max_tools,
            max_msgs: defaults.max_msgs,
            result_char_limit: defaults.max_tool_result_chars,
            result_token_limit: defaults.max_tool_result_tokens,
            log_preview_chars: defaults.max_log_chars,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            dry_run: false,
        }
    }

    /// Apply the loop-relevant subset of [`Settings`].
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.safe_mode = settings.safe_mode;
        self.max_tools = settings.max_tools;
        self.max_msgs = settings.max_msgs;
        self.result_char_limit = settings.max_tool_result_chars;
        self.result_token_limit = settings.max_tool_result_tokens;
        self.log_preview_chars = settings.max_log_chars;
        self.temperature = settings.temperature;
        self.max_tokens = settings.max_tokens;
        self
    }

    pub fn safe_mode(mut self, on: bool) -> Self {
        self.safe_mode = on;
        self
    }

    pub fn max_tools(mut self, budget: u32) -> Self {
        self.max_tools = budget;
        self
    }

    pub fn transcript_window(mut self, max_msgs: usize) -> Self {
        self.max_msgs = max_msgs;
        self
    }

    /// Validate and route calls without dispatching; tools answer with an
    /// echo of their arguments.
    pub fn dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    /// Run one conversation to completion and return the final answer.
    pub async fn chat(&self, prompt: &str) -> Result<String, Error> {
        let conversation_id = Uuid::new_v4().to_string();
        let turn_start = Instant::now();

        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::user(prompt));

        let mut tools_used: u32 = 0;
        let mut turn: u32 = 0;
        let mut streak: u32 = 0;
        let mut last_tool = String::new();

        while tools_used < self.max_tools {
            turn += 1;
            transcript.compact(self.max_msgs);
            transcript.push(ChatMessage::system(format!(
                "[remaining_tools={}]",
                self.max_tools - tools_used
            )));

            let reply = self.call_model(&transcript, &conversation_id, turn, false).await?;
            let (text, mut calls) = match reply.tool_calls {
                Some(calls) => (reply.text, calls),
                None => parser::parse_tool_calls(&reply.text),
            };

            let remaining = (self.max_tools - tools_used) as usize;
            if calls.len() > remaining {
                warn!(
                    conversation_id = %conversation_id,
                    requested = calls.len(),
                    remaining,
                    "tool_limit_reached"
                );
                self.metrics.record_budget_exceeded();
                calls.truncate(remaining);
            }

            transcript.push(ChatMessage::assistant(&text));

            if calls.is_empty() {
                match parser::parse_bare_call(&text) {
                    Some(call) => calls.push(call),
                    None => {
                        self.metrics.record_agent_turn(turn_start.elapsed().as_millis() as u64);
                        return Ok(normalize_answer(&text));
                    }
                }
            }

            for call in calls {
                let name = call.name.trim().to_lowercase();
                if !parser::is_valid_tool_name(&name) {
                    warn!(conversation_id = %conversation_id, name = %call.name, "invalid tool name, skipping");
                    continue;
                }
                // A different tool ends the failure streak before its own
                // outcome is judged.
                if name != last_tool {
                    streak = 0;
                    last_tool = name.clone();
                }

                let call_id = if call.id.is_empty() {
                    Uuid::new_v4().to_string()
                } else {
                    call.id.clone()
                };

                let Some(spec) = self.registry.lookup(&name) else {
                    streak += 1;
                    warn!(conversation_id = %conversation_id, tool = %name, streak, "unknown tool");
                    transcript.push(ChatMessage::tool(
                        &name,
                        &call_id,
                        json!({
                            "kind": "error",
                            "code": "unknown_tool",
                            "note": format!("tool {name} unavailable"),
                            "retry_safe": false,
                        })
                        .to_string(),
                    ));
                    if streak >= FAILURE_STREAK_LIMIT {
                        return self.trip_breaker(&conversation_id, &name, turn_start);
                    }
                    continue;
                };

                // Policy refusals feed back to the model but do not count
                // toward the failure streak or the budget.
                if violates_policy(&spec, self.safe_mode) {
                    self.metrics.record_policy_block("destructive");
                    warn!(conversation_id = %conversation_id, tool = %name, "destructive tool blocked in safe mode");
                    transcript.push(ChatMessage::tool(
                        &name,
                        &call_id,
                        json!({
                            "kind": "error",
                            "code": "forbidden_in_safe_mode",
                            "note": format!("tool {name} is destructive and safe_mode is on"),
                            "hint": "ask the user for confirmation or propose an alternative",
                            "retry_safe": false,
                        })
                        .to_string(),
                    ));
                    continue;
                }
                if self.safe_mode && !spec.allowed_in_safe_mode {
                    self.metrics.record_policy_block("safe_mode");
                    warn!(conversation_id = %conversation_id, tool = %name, "tool not allowed in safe mode");
                    transcript.push(ChatMessage::tool(
                        &name,
                        &call_id,
                        json!({
                            "kind": "error",
                            "code": "disabled_in_safe_mode",
                            "note": format!("tool {name} disabled in safe_mode"),
                            "retry_safe": false,
                        })
                        .to_string(),
                    ));
                    continue;
                }

                let args = parser::clamp_args(call.args);

                if let Some(schema) = &spec.schema
                    && let Err(violation) = schema.validate(&args)
                {
                    use ratchet_core::schema::SchemaViolation;
                    streak += 1;
                    let (code, fields) = match &violation {
                        SchemaViolation::Missing(fields) => ("missing_args", fields),
                        SchemaViolation::InvalidType(fields) => ("invalid_type", fields),
                    };
                    warn!(conversation_id = %conversation_id, tool = %name, code, fields = %fields.join(", "), streak, "argument validation failed");
                    transcript.push(ChatMessage::tool(
                        &name,
                        &call_id,
                        json!({
                            "kind": "error",
                            "code": code,
                            "note": fields.join(", "),
                            "retry_safe": false,
                        })
                        .to_string(),
                    ));
                    if streak >= FAILURE_STREAK_LIMIT {
                        return self.trip_breaker(&conversation_id, &name, turn_start);
                    }
                    continue;
                }

                if self.dry_run {
                    transcript.push(ChatMessage::tool(
                        &name,
                        &call_id,
                        json!({
                            "kind": "ok",
                            "result": {"dry_run": true, "args": args},
                        })
                        .to_string(),
                    ));
                    tools_used += 1;
                    continue;
                }

                let attempts = 1 + spec.retry_count;
                let exec_call = ToolCall::new(name.clone(), args, call_id.clone());
                let mut envelope = Envelope::ok(json!(null));
                let mut payload = String::new();
                for attempt in 1..=attempts {
                    let call_start = Instant::now();
                    envelope = self.dispatcher.dispatch(&exec_call, self.safe_mode).await;
                    let raw = serde_json::to_string(&envelope)?;
                    payload = sanitize(&raw, self.result_char_limit, self.result_token_limit);

                    let preview: String = payload.chars().take(self.log_preview_chars).collect();
                    info!(
                        conversation_id = %conversation_id,
                        tool = %name,
                        call_id = %call_id,
                        outcome = envelope.outcome(),
                        elapsed_ms = call_start.elapsed().as_millis() as u64,
                        size_before = raw.len(),
                        size_after = payload.len(),
                        attempt,
                        attempts,
                        preview = %preview,
                        "toolcall"
                    );

                    if envelope.is_ok() {
                        break;
                    }
                    if attempt < attempts {
                        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    }
                }

                transcript.push(ChatMessage::tool(&name, &call_id, payload));
                tools_used += 1;

                if envelope.is_ok() {
                    streak = 0;
                } else {
                    streak += 1;
                }
                if streak >= FAILURE_STREAK_LIMIT {
                    return self.trip_breaker(&conversation_id, &name, turn_start);
                }

                transcript.compact(self.max_msgs);
            }
        }

        // Budget exhausted: one last model call with no tool processing.
        turn += 1;
        transcript.compact(self.max_msgs);
        let reply = self.call_model(&transcript, &conversation_id, turn, true).await?;
        let text = match reply.tool_calls {
            Some(_) => reply.text,
            None => parser::parse_tool_calls(&reply.text).0,
        };
        self.metrics.record_agent_turn(turn_start.elapsed().as_millis() as u64);
        Ok(normalize_answer(&text))
    }

    async fn call_model(
        &self,
        transcript: &Transcript,
        conversation_id: &str,
        turn: u32,
        final_call: bool,
    ) -> Result<ModelReply, Error> {
        let params = GenerationParams {
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        };
        let start = Instant::now();
        let reply = self.backend.generate(transcript, &params).await?;
        let elapsed = start.elapsed();

        // Exact token counts when the backend reports usage, a whitespace
        // word count otherwise.
        let (completion_tokens, prompt_tokens, exact) = match &reply.usage {
            Some(usage) => (
                u64::from(usage.completion_tokens),
                u64::from(usage.prompt_tokens),
                true,
            ),
            None => (reply.text.split_whitespace().count() as u64, 0, false),
        };
        let secs = elapsed.as_secs_f64();
        let tokens_per_sec = if secs > 0.0 {
            completion_tokens as f64 / secs
        } else {
            f64::INFINITY
        };
        self.metrics
            .record_gauge("tokens_per_sec", tokens_per_sec, self.backend.name());

        info!(
            conversation_id = %conversation_id,
            turn,
            backend = self.backend.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            completion_tokens,
            prompt_tokens,
            exact_usage = exact,
            tokens_per_sec,
            safe_mode = self.safe_mode,
            final_call,
            "llm_call"
        );
        Ok(reply)
    }

    fn trip_breaker(
        &self,
        conversation_id: &str,
        tool: &str,
        turn_start: Instant,
    ) -> Result<String, Error> {
        warn!(conversation_id = %conversation_id, tool = %tool, "circuit breaker tripped");
        self.metrics.record_agent_turn(turn_start.elapsed().as_millis() as u64);
        Ok(CIRCUIT_BREAKER_REPLY.to_string())
    }
}

/// Collapse whitespace runs before newlines and trim the ends.
fn normalize_answer(text: &str) -> String {
    RE_TRAILING_WS.replace_all(text.trim(), "\n").into_owned()
}
