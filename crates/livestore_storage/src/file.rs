//! Single-file backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A backend appending to one file on disk.
///
/// `flush` hands buffered bytes to the OS and `sync` calls `sync_all`.
/// The store serializes access to the log itself, so the file handle needs no
/// lock of its own; reads go through a cloned handle to keep `read_at` on `&self`.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    writer: File,
    reader: File,
    size: u64,
}

impl FileBackend {
    /// Opens `path`, creating an empty file when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let writer = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let reader = writer.try_clone()?;
        let size = writer.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            reader,
            size,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if end > self.size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        let mut buffer = vec![0u8; len];
        if len > 0 {
            let mut reader = &self.reader;
            reader.seek(SeekFrom::Start(offset))?;
            reader.read_exact(&mut buffer)?;
        }
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        if !data.is_empty() {
            self.writer.seek(SeekFrom::Start(offset))?;
            self.writer.write_all(data)?;
            self.size += data.len() as u64;
        }
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.writer.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if new_size > self.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: self.size,
            });
        }
        self.writer.set_len(new_size)?;
        self.size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appended_bytes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.log");
        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"first").unwrap();
            backend.append(b"second").unwrap();
            backend.sync().unwrap();
        }
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(5, 6).unwrap(), b"second");
    }

    #[test]
    fn truncate_shrinks_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"0123456789").unwrap();
        backend.truncate(4).unwrap();
        assert_eq!(backend.size().unwrap(), 4);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4);
        assert_eq!(backend.append(b"x").unwrap(), 4);
        assert_eq!(backend.read_at(0, 5).unwrap(), b"0123x");
    }

    #[test]
    fn read_past_end_is_rejected() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("empty.log")).unwrap();
        assert!(matches!(
            backend.read_at(0, 1),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(backend.read_at(0, 0).unwrap().is_empty());
    }
}
