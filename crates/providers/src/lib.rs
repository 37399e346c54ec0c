//! # ratchet-providers
//!
//! [`ModelBackend`](ratchet_core::ModelBackend) implementations. One
//! backend covers nearly everything in practice: the OpenAI-compatible
//! chat-completions dialect.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatBackend;
