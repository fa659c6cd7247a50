//! Error types for the finger runtime broker
//!
//! The taxonomy follows outward effect: validation and not-found map to
//! caller errors, busy/governance are dispatch-level refusals, transport
//! covers retryable send failures, internal covers everything converted
//! from a caught panic at a component boundary.

use thiserror::Error;

/// Result type alias used throughout the workspace
pub type FingerResult<T> = Result<T, FingerError>;

/// Error type for all finger operations
#[derive(Error, Debug)]
pub enum FingerError {
    /// Request validation failed; surfaced verbatim, never retried
    #[error("{0}")]
    Validation(String),

    /// A named resource (agent, module, workflow, session) does not exist
    #[error("{0}")]
    NotFound(String),

    /// Capacity refusal: busy target, deadlock risk, queue timeout
    #[error("{0}")]
    Busy(String),

    /// Blocked by orchestration governance (disabled profile)
    #[error("{0}")]
    Governance(String),

    /// Transient send failure; retried inside the message hub
    #[error("transport error: {0}")]
    Transport(String),

    /// An event subscriber failed; logged, never propagated
    #[error("subscriber error: {0}")]
    Subscriber(String),

    /// Configuration error (invalid orchestration config, bad profile)
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal failure caught at a component boundary
    #[error("internal error: {0}")]
    Internal(String),
}

impl FingerError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a busy/capacity error
    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    /// Create a governance error
    pub fn governance(msg: impl Into<String>) -> Self {
        Self::Governance(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is a caller error (HTTP 400 class)
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound(_) | Self::Busy(_) | Self::Governance(_)
        )
    }
}
