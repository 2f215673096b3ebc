//! Error types for the conversational core.

use londonway_core::error::LondonWayError;
use uuid::Uuid;

/// Failures reported by a generative-language backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend refused an augmented request (HTTP 403 or equivalent).
    /// Triggers a single downgrade-and-retry.
    #[error("permission denied: {0}")]
    Permission(String),
    /// Network or server-side hiccup. Not retried automatically.
    #[error("transient backend failure: {0}")]
    Transient(String),
    #[error("backend failure: {0}")]
    Unknown(String),
}

impl BackendError {
    /// Classify an error from an optional HTTP status and its detail text.
    pub fn classify(status: Option<u16>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if status == Some(403) || detail.to_lowercase().contains("permission") {
            return BackendError::Permission(detail);
        }
        match status {
            Some(408 | 429) | Some(500..=599) => BackendError::Transient(detail),
            _ => BackendError::Unknown(detail),
        }
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, BackendError::Permission(_))
    }
}

/// Errors from the chat session.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("a response is already streaming")]
    Busy,
    #[error("message not found: {0}")]
    MessageNotFound(Uuid),
    #[error("message is not streaming: {0}")]
    NotStreaming(Uuid),
    #[error("no turn is in progress")]
    NoActiveTurn,
    #[error("favorite label cannot be empty")]
    EmptyLabel,
    #[error("favorite not found: {0}")]
    FavoriteNotFound(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<LondonWayError> for ChatError {
    fn from(err: LondonWayError) -> Self {
        ChatError::Storage(err.to_string())
    }
}
