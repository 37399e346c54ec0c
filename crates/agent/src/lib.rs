//! # ratchet-agent
//!
//! The conversation loop and the tolerant tool-call parser. [`Agent`]
//! drives one model backend against a tool registry under per-chat
//! budgets, a failure circuit breaker, and safe-mode policy.

pub mod loop_runner;
pub mod parser;

pub use loop_runner::{Agent, CIRCUIT_BREAKER_REPLY, FAILURE_STREAK_LIMIT};
pub use parser::{parse_bare_call, parse_tool_calls};
