//! Transcript and message domain types.
//!
//! A `Transcript` is the ordered message history one conversation exchanges
//! with the model and its tools. It is owned by a single agent loop, mutated
//! only by appending — the one exception is `compact()`, which bounds the
//! context window while preserving the original task statement.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// Runtime instructions (budget notes, compaction markers)
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// For tool messages, the originating tool name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// For tool messages, the tool call this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
        }
    }

    /// Create a tool result message.
    pub fn tool(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_name: Some(tool_name.into()),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Marker inserted by `Transcript::compact` in place of dropped history.
pub const COMPACTION_MARKER: &str = "[context compacted]";

/// An append-only ordered message history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Bound the transcript to at most `max_msgs` messages (plus the marker).
    ///
    /// Keeps the first user message (the original task statement) and the
    /// most recent `max_msgs - 1` messages, and prepends a synthetic system
    /// marker noting the compaction. No-op when already within bounds.
    pub fn compact(&mut self, max_msgs: usize) {
        if self.messages.len() <= max_msgs {
            return;
        }
        let mut kept: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .take(1)
            .cloned()
            .collect();
        let tail_start = self.messages.len().saturating_sub(max_msgs.saturating_sub(1));
        kept.extend_from_slice(&self.messages[tail_start..]);
        kept.insert(0, ChatMessage::system(COMPACTION_MARKER));
        self.messages = kept;
    }
}
