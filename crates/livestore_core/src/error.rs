//! Error types for the livestore core.

use crate::id::ObjectId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by transactions, entities and the object store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] livestore_storage::StorageError),

    /// I/O error outside the backend (directory, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An entity was touched with no transaction bound to the calling scope.
    #[error("no transaction bound to the current scope")]
    TransactionAbsent,

    /// The bound transaction has already committed or rolled back.
    #[error("transaction already finished")]
    TransactionFinished,

    /// A mutation was attempted inside a read scope.
    #[error("transaction is read-only")]
    TransactionReadOnly,

    /// A write scope was requested by a thread holding a read scope.
    #[error("write access cannot be acquired inside a read scope")]
    WriteInsideReadForbidden,

    /// An entity save-state transition that must not happen.
    #[error("invalid entity state: {message}")]
    InvalidEntityState {
        /// Description of the offending transition.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A list index outside the current bounds.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Length at the time of the call.
        len: usize,
    },

    /// A record could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// The object log is malformed.
    #[error("object log corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// A log frame failed its checksum.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the frame.
        actual: u32,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// A referenced object has no committed record.
    #[error("object not found: {id}")]
    ObjectNotFound {
        /// The missing object.
        id: ObjectId,
    },

    /// A record decoded as a different kind than the caller expected.
    #[error("object {id} is a {actual}, expected {expected}")]
    KindMismatch {
        /// The object.
        id: ObjectId,
        /// Kind requested by the caller.
        expected: &'static str,
        /// Kind found in the record.
        actual: String,
    },

    /// A non-owning link whose target is no longer alive.
    #[error("link target {id} is no longer alive")]
    DanglingLink {
        /// Id of the missing target.
        id: ObjectId,
    },
}

impl CoreError {
    /// Creates an invalid entity state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidEntityState {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl ToString) -> Self {
        Self::Codec {
            message: message.to_string(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}
