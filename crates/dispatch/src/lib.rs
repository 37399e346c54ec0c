//! # ratchet-dispatch
//!
//! Executes one tool invocation end-to-end: policy gate, token-bucket rate
//! limiting, bounded-time execution, and classification of the outcome into
//! the uniform [`ratchet_core::Envelope`].

pub mod dispatcher;
pub mod rate_limit;

pub use dispatcher::Dispatcher;
pub use rate_limit::RateLimiter;
