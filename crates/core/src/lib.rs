//! # ratchet-core
//!
//! Domain types, traits, and error definitions for the ratchet agent runtime.
//! This crate defines the model every other crate implements against:
//! the transcript, the tool registry, the result envelope, the typed
//! argument schema, and the model-backend seam.
//!
//! All crates depend inward on core; core depends on nothing but serde.

pub mod backend;
pub mod envelope;
pub mod error;
pub mod message;
pub mod schema;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use backend::{GenerationParams, ModelBackend, ModelReply, Usage};
pub use envelope::{Envelope, ErrorCode};
pub use error::{BackendError, Error, Result};
pub use message::{ChatMessage, Role, Transcript};
pub use schema::{ArgKind, ArgSchema, PropertySpec, SchemaViolation};
pub use tool::{Capability, SafetyClass, ToolCall, ToolRegistry, ToolSpec, violates_policy};
