//! Error types for the delivery core.

use thiserror::Error;

/// Result type alias for delivery operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Main error type for the delivery core.
///
/// No variant is fatal to the process; every failure is scoped to a single
/// message or room. Transport failures are recovered locally by the
/// session layer (reconnect + resync); persistence failures are surfaced
/// with the original content so the user can retry the exact text.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error("failed to persist message: {reason}")]
    Persistence {
        reason: String,
        /// Original message body, preserved for retry
        content: String,
    },

    #[error("invalid message: {reason}")]
    Validation { reason: String },

    #[error("not joined to room {chat_id}")]
    NotJoined { chat_id: String },
}

impl DeliveryError {
    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a persistence error, preserving the message body for retry
    pub fn persistence(reason: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
            content: content.into(),
        }
    }

    /// Create a validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a not-joined error
    pub fn not_joined(chat_id: impl Into<String>) -> Self {
        Self::NotJoined {
            chat_id: chat_id.into(),
        }
    }

    /// Whether the caller should offer a retry with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Persistence { .. }
        )
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport {
            reason: format!("event serialization error: {}", err),
        }
    }
}
