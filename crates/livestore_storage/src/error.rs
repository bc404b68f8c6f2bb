//! Storage errors.

use std::io;
use thiserror::Error;

/// Result alias for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`StorageBackend`](crate::StorageBackend).
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read extended past the end of the store.
    #[error("read beyond end of store: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Store size at the time of the read.
        size: u64,
    },

    /// A truncation asked to grow the store.
    #[error("cannot truncate to {requested}: store is only {size} bytes")]
    TruncateBeyondEnd {
        /// Requested size.
        requested: u64,
        /// Actual size.
        size: u64,
    },

    /// A failure injected by [`FaultyBackend`](crate::FaultyBackend).
    #[error("injected fault during {operation}")]
    Injected {
        /// The backend operation that failed.
        operation: &'static str,
    },
}
