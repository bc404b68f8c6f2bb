//! Shared in-memory backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A backend holding its bytes in memory.
///
/// Cloning the backend yields a second handle onto the same buffer. A store
/// opened on one handle and dropped can be reopened on the other, which is how
/// tests simulate a process restart without touching the file system.
///
/// ```rust
/// use livestore_storage::{InMemoryBackend, StorageBackend};
///
/// let mut first = InMemoryBackend::new();
/// let second = first.clone();
/// first.append(b"abc").unwrap();
/// assert_eq!(second.size().unwrap(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that starts with `bytes`.
    #[must_use]
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    /// Copies the current contents out.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    /// Overwrites one byte in place. Test helper for corruption scenarios.
    pub fn corrupt_byte(&self, offset: usize) {
        if let Some(byte) = self.bytes.write().get_mut(offset) {
            *byte ^= 0xFF;
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let size = bytes.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(bytes[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.write();
        let size = bytes.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        bytes.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_appends() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"one").unwrap(), 0);
        assert_eq!(backend.append(b"two").unwrap(), 3);
        assert_eq!(backend.read_at(3, 3).unwrap(), b"two");
    }

    #[test]
    fn reading_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"short").unwrap();
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { size: 5, .. })
        ));
    }

    #[test]
    fn clones_share_the_buffer() {
        let mut writer = InMemoryBackend::new();
        let reader = writer.clone();
        writer.append(b"shared").unwrap();
        assert_eq!(reader.snapshot(), b"shared");
    }

    #[test]
    fn truncate_discards_tail() {
        let mut backend = InMemoryBackend::with_bytes(b"keep-drop".to_vec());
        backend.truncate(4).unwrap();
        assert_eq!(backend.snapshot(), b"keep");
        assert!(matches!(
            backend.truncate(10),
            Err(StorageError::TruncateBeyondEnd { requested: 10, size: 4 })
        ));
    }

    #[test]
    fn corrupt_byte_flips_bits() {
        let backend = InMemoryBackend::with_bytes(vec![0x0F]);
        backend.corrupt_byte(0);
        assert_eq!(backend.snapshot(), vec![0xF0]);
        backend.corrupt_byte(99);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn appended_chunks_read_back(chunks in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..32), 1..16)
            ) {
                let mut backend = InMemoryBackend::new();
                let offsets: Vec<u64> = chunks
                    .iter()
                    .map(|chunk| backend.append(chunk).unwrap())
                    .collect();

                for (chunk, offset) in chunks.iter().zip(offsets) {
                    prop_assert_eq!(&backend.read_at(offset, chunk.len()).unwrap(), chunk);
                }
                let total: usize = chunks.iter().map(Vec::len).sum();
                prop_assert_eq!(backend.size().unwrap(), total as u64);
            }
        }
    }
}
