//! The dispatch pipeline.
//!
//! `dispatch` runs one tool invocation through four gates, each a possible
//! early return: registry lookup, safe-mode policy, token bucket, bounded
//! execution. The policy gate runs before rate limiting so blocked calls
//! never consume quota. Every branch records latency and outcome metrics
//! keyed by tool name.

use std::sync::Arc;
use std::time::Instant;

use ratchet_core::tool::{ToolCall, ToolRegistry};
use ratchet_core::{Envelope, ErrorCode};
use ratchet_telemetry::Metrics;
use tracing::{debug, warn};

use crate::rate_limit::RateLimiter;

/// Executes tool calls against a shared registry under shared rate buckets.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    limiter: RateLimiter,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            limiter: RateLimiter::new(),
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run one tool call end-to-end and classify the outcome.
    ///
    /// Timeout semantics are best-effort abandonment: the capability runs on
    /// a spawned task, and when the deadline expires the join handle is
    /// dropped. The task may run to completion in the background; its result
    /// is discarded. Capabilities holding threads or other resources keep
    /// them until they finish on their own.
    pub async fn dispatch(&self, call: &ToolCall, safe_mode: bool) -> Envelope {
        let name = call.name.as_str();
        let Some(spec) = self.registry.lookup(name) else {
            return Envelope::error(ErrorCode::NotFound, "tool not found");
        };

        let start = Instant::now();

        if safe_mode && !spec.allowed_in_safe_mode {
            self.metrics.record_policy_block("safe_mode");
            self.record(name, "forbidden", start);
            return Envelope::error(ErrorCode::Forbidden, "disabled in safe mode");
        }

        if !self.limiter.try_acquire(name, spec.rate_limit_per_min) {
            debug!(tool = name, "rate limit exceeded");
            self.record(name, "rate_limit", start);
            return Envelope::error(ErrorCode::RateLimit, "rate limit exceeded");
        }

        let capability = Arc::clone(&spec.capability);
        let args = call.args.clone();
        let task = tokio::spawn(async move { capability.invoke(args).await });

        match tokio::time::timeout(spec.timeout, task).await {
            Err(_) => {
                // deadline expired; the task is abandoned, not awaited
                let elapsed_ms = start.elapsed().as_millis() as u64;
                warn!(tool = name, elapsed_ms, "tool timed out");
                self.record(name, "timeout", start);
                Envelope::Error {
                    code: ErrorCode::Timeout,
                    message: "tool timed out".into(),
                    hint: String::new(),
                    elapsed_ms: Some(elapsed_ms),
                }
            }
            Ok(Err(join_err)) => {
                warn!(tool = name, error = %join_err, "tool task failed");
                self.record(name, "internal", start);
                Envelope::error(ErrorCode::Internal, join_err.to_string())
            }
            Ok(Ok(envelope)) => {
                self.record(name, envelope.outcome(), start);
                envelope
            }
        }
    }

    fn record(&self, name: &str, outcome: &str, start: Instant) {
        self.metrics
            .record_tool_call(name, outcome, start.elapsed().as_millis() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ratchet_core::tool::{Capability, ToolSpec};
    use serde_json::{Map, Value, json};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct OkCapability;

    #[async_trait]
    impl Capability for OkCapability {
        async fn invoke(&self, _args: Map<String, Value>) -> Envelope {
            Envelope::ok(json!("done"))
        }
    }

    struct SlowCapability {
        completions: Arc<AtomicU64>,
    }

    #[async_trait]
    impl Capability for SlowCapability {
        async fn invoke(&self, _args: Map<String, Value>) -> Envelope {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.completions.fetch_add(1, Ordering::SeqCst);
            Envelope::ok(json!("too late"))
        }
    }

    struct FailingCapability;

    #[async_trait]
    impl Capability for FailingCapability {
        async fn invoke(&self, _args: Map<String, Value>) -> Envelope {
            Envelope::error(ErrorCode::ToolError, "backend exploded")
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall::new(name, Map::new(), "call_1")
    }

    fn dispatcher_with(specs: Vec<ToolSpec>) -> Dispatcher {
        let registry = Arc::new(ToolRegistry::new());
        for spec in specs {
            registry.register(spec);
        }
        Dispatcher::new(registry, Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let dispatcher = dispatcher_with(vec![]);
        let env = dispatcher.dispatch(&call("ghost"), false).await;
        assert_eq!(env.outcome(), "not_found");
    }

    #[tokio::test]
    async fn success_passes_envelope_through() {
        let dispatcher = dispatcher_with(vec![
            ToolSpec::new("ok.tool", Arc::new(OkCapability)).allowed_in_safe_mode(true),
        ]);
        let env = dispatcher.dispatch(&call("ok.tool"), false).await;
        assert_eq!(env, Envelope::ok(json!("done")));
        assert_eq!(dispatcher.metrics.outcome_count("ok.tool", "ok"), 1);
    }

    #[tokio::test]
    async fn safe_mode_blocks_unlisted_tools_before_rate_limit() {
        let dispatcher = dispatcher_with(vec![
            ToolSpec::new("side.effect", Arc::new(OkCapability))
                .allowed_in_safe_mode(false)
                .rate_limit_per_min(1),
        ]);

        // blocked calls never debit the bucket
        for _ in 0..5 {
            let env = dispatcher.dispatch(&call("side.effect"), true).await;
            assert_eq!(env.outcome(), "forbidden");
        }
        assert_eq!(dispatcher.metrics.policy_block_count("safe_mode"), 5);

        // the single bucket token is still available once safe mode is off
        let env = dispatcher.dispatch(&call("side.effect"), false).await;
        assert!(env.is_ok());
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_returns_rate_limit() {
        let dispatcher = dispatcher_with(vec![
            ToolSpec::new("limited", Arc::new(OkCapability))
                .allowed_in_safe_mode(true)
                .rate_limit_per_min(2),
        ]);
        assert!(dispatcher.dispatch(&call("limited"), false).await.is_ok());
        assert!(dispatcher.dispatch(&call("limited"), false).await.is_ok());
        let env = dispatcher.dispatch(&call("limited"), false).await;
        assert_eq!(env.outcome(), "rate_limit");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_abandons_the_capability() {
        let completions = Arc::new(AtomicU64::new(0));
        let dispatcher = dispatcher_with(vec![
            ToolSpec::new("slow", Arc::new(SlowCapability { completions: Arc::clone(&completions) }))
                .allowed_in_safe_mode(true)
                .timeout(Duration::from_millis(100)),
        ]);

        let env = dispatcher.dispatch(&call("slow"), false).await;
        match env {
            Envelope::Error { code, elapsed_ms, .. } => {
                assert_eq!(code, ErrorCode::Timeout);
                assert!(elapsed_ms.is_some());
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        // the abandoned task never delivered a result to the caller
        assert_eq!(completions.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.metrics.outcome_count("slow", "timeout"), 1);
    }

    #[tokio::test]
    async fn tool_errors_keep_their_code() {
        let dispatcher = dispatcher_with(vec![
            ToolSpec::new("flaky", Arc::new(FailingCapability)).allowed_in_safe_mode(true),
        ]);
        let env = dispatcher.dispatch(&call("flaky"), false).await;
        assert_eq!(env.outcome(), "tool_error");
        assert_eq!(dispatcher.metrics.outcome_count("flaky", "tool_error"), 1);
    }
}
