//! Error types for the Sotto domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Provider errors additionally carry a resilience classification
//! (`ErrorClass`) that the retry layer uses to decide between retrying,
//! falling back to a degraded configuration, or failing fast.

use thiserror::Error;

/// The top-level error type for all Sotto operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Conversation-state errors ---
    #[error("State error: {0}")]
    State(#[from] StateError),

    // --- Context-store errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Resilience classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Temporary condition — retry with backoff.
    Transient,
    /// Provider signalled capacity or memory limits — one degraded fallback
    /// attempt is warranted before surfacing.
    ResourceExhausted,
    /// Malformed input, unsupported configuration, bad credentials — fail
    /// immediately, retrying cannot help.
    Permanent,
}

/// Anything the resilience layer can make a retry decision about.
pub trait Classify {
    fn classify(&self) -> ErrorClass;
}

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

    #[error("Provider out of capacity: {0}")]
    ResourceExhausted(String),

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),
}

impl Classify for ProviderError {
    fn classify(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::StreamInterrupted(_) => ErrorClass::Transient,
            // 5xx responses are the provider's problem, not ours
            Self::ApiError { status_code, .. } if (500..600).contains(status_code) => {
                ErrorClass::Transient
            }
            Self::ResourceExhausted(_) => ErrorClass::ResourceExhausted,
            Self::ApiError { .. }
            | Self::AuthenticationFailed(_)
            | Self::ModelNotFound(_)
            | Self::NotConfigured(_)
            | Self::UnsupportedInput(_) => ErrorClass::Permanent,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    Duplicate(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("State serialization failed: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Tool-result message is missing its tool_call_id")]
    DanglingToolResult,
}
