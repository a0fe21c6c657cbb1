//! Error types for the agentloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all agentloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// A message safe to show to the end user.
    ///
    /// Never includes response bodies, request ids or other backend details.
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(ProviderError::RateLimited { retry_after_secs }) => format!(
                "The model service is rate limiting requests. Please retry in {retry_after_secs}s."
            ),
            Self::Provider(ProviderError::AuthenticationFailed(_)) => {
                "The model service rejected our credentials.".into()
            }
            Self::Provider(ProviderError::Timeout(_)) => {
                "The model service did not answer in time.".into()
            }
            Self::Provider(ProviderError::Network(_))
            | Self::Provider(ProviderError::StreamInterrupted(_)) => {
                "The connection to the model service was lost.".into()
            }
            Self::Provider(ProviderError::ModelNotFound(_)) => {
                "The configured model is not available.".into()
            }
            Self::Provider(_) => "The model service failed to produce a reply.".into(),
            _ => "The agent hit an internal problem and stopped.".into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted document at {path}: {reason}")]
    Corrupted { path: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool panicked: {0}")]
    Panicked(String),
}
