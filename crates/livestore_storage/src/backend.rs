//! The backend trait.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// Offsets returned from [`append`](StorageBackend::append) stay valid until
/// the store is truncated below them. Bytes become durable only after
/// [`flush`](StorageBackend::flush) (pushed to the OS) or
/// [`sync`](StorageBackend::sync) (on stable media).
pub trait StorageBackend: Send + Sync {
    /// Reads exactly `len` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// when the range is not fully inside the store, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes could not be written.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes appended bytes out of process buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces appended bytes and metadata to stable media.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Current length in bytes, which is also the next append offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Drops every byte at or after `new_size`.
    ///
    /// Used to discard a torn or failed tail of the log.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TruncateBeyondEnd`](crate::StorageError::TruncateBeyondEnd)
    /// when `new_size` exceeds the current size, or an I/O error.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
