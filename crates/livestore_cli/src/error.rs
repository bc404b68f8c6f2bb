//! Error types for the notes service.

use livestore_core::CoreError;
use thiserror::Error;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// A note that breaks a content rule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The title is empty or whitespace.
    #[error("note name must not be blank")]
    BlankName,

    /// The content contains a question mark.
    #[error("note content does not support question marks")]
    QuestionMark,
}

/// Errors raised by [`NoteService`](crate::NoteService).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The store or a transaction failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A note was rejected; the write that carried it was rolled back.
    #[error("invalid note: {0}")]
    Validation(#[from] ValidationError),

    /// No user has this name.
    #[error("unknown user: {name}")]
    UnknownUser {
        /// The name that was looked up.
        name: String,
    },

    /// A user with this name already exists.
    #[error("user already exists: {name}")]
    DuplicateUser {
        /// The name that is taken.
        name: String,
    },
}
