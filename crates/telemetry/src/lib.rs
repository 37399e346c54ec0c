//! # ratchet-telemetry
//!
//! Thread-safe metrics for the agent runtime: per-tool latency windows
//! with percentiles, outcome counters, policy-block counters, labeled
//! gauges, and agent-turn timings.
//!
//! `Metrics` is a service object constructed once at startup and injected
//! into the dispatcher and the conversation loop — no module-level globals.
//! Tests reset it via [`Metrics::reset`].

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// Samples kept per latency window.
const WINDOW: usize = 100;

#[derive(Debug, Default)]
struct Inner {
    /// Per-tool dispatch latency samples (most recent last)
    tool_latency_ms: HashMap<String, VecDeque<u64>>,
    /// Dispatch outcomes keyed by (tool, outcome class)
    tool_outcomes: HashMap<(String, String), u64>,
    /// Policy blocks keyed by reason (`destructive`, `safe_mode`)
    policy_blocks: HashMap<String, u64>,
    /// Labeled gauges, e.g. tokens_per_sec by model
    gauges: HashMap<(String, String), f64>,
    /// Whole-conversation latency samples
    agent_turn_ms: VecDeque<u64>,
    /// Calls dropped for exceeding the per-conversation budget
    budget_exceeded: u64,
}

/// Latency percentiles for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub p50: Option<u64>,
    pub p95: Option<u64>,
}

/// Point-in-time metrics report.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub tool_latency_ms: HashMap<String, LatencySummary>,
    /// `tool/outcome` -> count
    pub tool_outcomes: HashMap<String, u64>,
    pub policy_blocks: HashMap<String, u64>,
    /// `name/label` -> last value
    pub gauges: HashMap<String, f64>,
    pub agent_turns: LatencySummary,
    pub budget_exceeded: u64,
}

/// The metrics service.
#[derive(Debug, Default)]
pub struct Metrics {
    inner: RwLock<Inner>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dispatch outcome with its latency.
    pub fn record_tool_call(&self, tool: &str, outcome: &str, elapsed_ms: u64) {
        let mut inner = self.inner.write().expect("metrics lock poisoned");
        let window = inner
            .tool_latency_ms
            .entry(tool.to_string())
            .or_insert_with(|| VecDeque::with_capacity(WINDOW));
        if window.len() == WINDOW {
            window.pop_front();
        }
        window.push_back(elapsed_ms);
        *inner
            .tool_outcomes
            .entry((tool.to_string(), outcome.to_string()))
            .or_insert(0) += 1;
    }

    /// Count a policy block by reason.
    pub fn record_policy_block(&self, reason: &str) {
        let mut inner = self.inner.write().expect("metrics lock poisoned");
        *inner.policy_blocks.entry(reason.to_string()).or_insert(0) += 1;
    }

    /// Set a labeled gauge to its latest value.
    pub fn record_gauge(&self, name: &str, value: f64, label: &str) {
        let mut inner = self.inner.write().expect("metrics lock poisoned");
        inner
            .gauges
            .insert((name.to_string(), label.to_string()), value);
    }

    /// Record the wall-clock duration of one whole `chat()` invocation.
    pub fn record_agent_turn(&self, elapsed_ms: u64) {
        let mut inner = self.inner.write().expect("metrics lock poisoned");
        if inner.agent_turn_ms.len() == WINDOW {
            inner.agent_turn_ms.pop_front();
        }
        inner.agent_turn_ms.push_back(elapsed_ms);
    }

    /// Count tool calls dropped for exceeding the conversation budget.
    pub fn record_budget_exceeded(&self) {
        let mut inner = self.inner.write().expect("metrics lock poisoned");
        inner.budget_exceeded += 1;
    }

    /// Total outcomes recorded for a (tool, outcome) pair.
    pub fn outcome_count(&self, tool: &str, outcome: &str) -> u64 {
        let inner = self.inner.read().expect("metrics lock poisoned");
        inner
            .tool_outcomes
            .get(&(tool.to_string(), outcome.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Total policy blocks recorded for a reason.
    pub fn policy_block_count(&self, reason: &str) -> u64 {
        let inner = self.inner.read().expect("metrics lock poisoned");
        inner.policy_blocks.get(reason).copied().unwrap_or(0)
    }

    pub fn budget_exceeded_count(&self) -> u64 {
        self.inner.read().expect("metrics lock poisoned").budget_exceeded
    }

    /// Produce a point-in-time report.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().expect("metrics lock poisoned");
        MetricsSnapshot {
            tool_latency_ms: inner
                .tool_latency_ms
                .iter()
                .map(|(tool, window)| (tool.clone(), summarize(window)))
                .collect(),
            tool_outcomes: inner
                .tool_outcomes
                .iter()
                .map(|((tool, outcome), count)| (format!("{tool}/{outcome}"), *count))
                .collect(),
            policy_blocks: inner.policy_blocks.clone(),
            gauges: inner
                .gauges
                .iter()
                .map(|((name, label), value)| (format!("{name}/{label}"), *value))
                .collect(),
            agent_turns: summarize(&inner.agent_turn_ms),
            budget_exceeded: inner.budget_exceeded,
        }
    }

    /// Drop all recorded data. Test isolation only.
    pub fn reset(&self) {
        let mut inner = self.inner.write().expect("metrics lock poisoned");
        *inner = Inner::default();
    }
}

fn summarize(window: &VecDeque<u64>) -> LatencySummary {
    LatencySummary {
        p50: percentile(window, 50.0),
        p95: percentile(window, 95.0),
    }
}

fn percentile(window: &VecDeque<u64>, pct: f64) -> Option<u64> {
    if window.is_empty() {
        return None;
    }
    let mut data: Vec<u64> = window.iter().copied().collect();
    data.sort_unstable();
    let mut k = (data.len() as f64 * pct / 100.0) as usize;
    if k >= data.len() {
        k = data.len() - 1;
    }
    Some(data[k])
}
