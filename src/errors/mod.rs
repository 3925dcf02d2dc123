//! Errors raised by the dialog engine
//!
//! Only conditions that abort a turn are errors. Prompt validation failures
//! and cancellation are ordinary control flow and travel as
//! [`DialogTurnStatus`](crate::value_objects::DialogTurnStatus) values.

use thiserror::Error;

/// Result alias used throughout the engine
pub type DialogResult<T> = Result<T, DialogError>;

/// Errors that can occur while running a turn
#[derive(Debug, Error)]
pub enum DialogError {
    /// `begin`/`replace` referenced an id absent from the dialog set
    #[error("unknown dialog '{0}'")]
    UnknownDialog(String),

    /// A dialog set already holds a dialog with this id
    #[error("dialog '{0}' is already registered")]
    DuplicateDialog(String),

    /// Persisted state failed structural validation
    #[error("corrupt dialog state: {0}")]
    CorruptState(String),

    /// Same-turn chained advance exceeded the configured budget
    #[error("dialog '{dialog_id}' exceeded {limit} chained steps in one turn")]
    StepLimitExceeded { dialog_id: String, limit: usize },

    /// A condition or value expression could not be parsed
    #[error("invalid expression '{expression}': {message}")]
    InvalidExpression { expression: String, message: String },

    /// `cancel_until` named a dialog that has no frame on the stack
    #[error("dialog '{0}' is not on the stack")]
    NotOnStack(String),

    /// A step tried to touch its frame after the frame was popped
    #[error("frame for dialog '{0}' is no longer active")]
    FrameNotActive(String),

    /// Optimistic concurrency retries were exhausted
    #[error("state for '{key}' changed concurrently {attempts} times in a row")]
    ConcurrencyConflict { key: String, attempts: usize },

    /// A state store collaborator failed
    #[error("state store error: {0}")]
    Store(String),

    /// JSON encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DialogError {
    /// Build an `InvalidExpression` error
    pub fn invalid_expression(expression: &str, message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expression: expression.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error came from loading persisted state
    pub fn is_corrupt_state(&self) -> bool {
        matches!(self, Self::CorruptState(_))
    }
}
