//! Error types for the ratchet domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Tool failures do not
//! appear here: tools report through the [`crate::Envelope`] union, never
//! through the error channel.

use thiserror::Error;

/// The top-level error type for runtime operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reaching the model backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}
