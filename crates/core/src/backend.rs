//! Model backend seam — the abstraction over language-model services.
//!
//! The runtime only needs one thing from a backend: hand it a transcript
//! and generation parameters, get generated text back. A backend may also
//! pre-parse tool calls (native function-calling APIs) and report token
//! usage; both are optional.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::message::Transcript;
use crate::tool::ToolCall;

/// Generation parameters forwarded to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Token accounting, when the backend reports it. Its absence switches the
/// loop's throughput metrics to word-count approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One generation result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelReply {
    /// The generated text (free-form; may embed tool-call markup)
    pub text: String,

    /// Pre-parsed structured calls. When present the runtime trusts them
    /// and skips text extraction entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: None,
            usage: None,
        }
    }
}

/// The language-model backend contract.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// A human-readable backend name for logs and metrics labels.
    fn name(&self) -> &str;

    /// Generate the next assistant turn for a transcript.
    async fn generate(
        &self,
        transcript: &Transcript,
        params: &GenerationParams,
    ) -> Result<ModelReply, BackendError>;
}
