//! Store directory management.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK          # advisory lock, one opener at a time
//! └─ objects.log   # the object log
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "objects.log";

/// An opened store directory. Holds the exclusive lock until dropped.
#[derive(Debug)]
pub(crate) struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens (or creates) the directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreLocked`] when another opener holds the lock,
    /// and an invalid-operation error when the path is missing and
    /// `create_if_missing` is false or the path is not a directory.
    pub(crate) fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(CoreError::invalid_operation(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_operation(format!(
                "store path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_opener_is_locked_out() {
        let dir = tempdir().unwrap();
        let first = StoreDir::open(dir.path(), true).unwrap();
        assert!(matches!(
            StoreDir::open(dir.path(), true),
            Err(CoreError::StoreLocked)
        ));
        drop(first);
        StoreDir::open(dir.path(), true).unwrap();
    }

    #[test]
    fn missing_directory_respects_create_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store");
        assert!(StoreDir::open(&path, false).is_err());
        let opened = StoreDir::open(&path, true).unwrap();
        assert_eq!(opened.path(), path.as_path());
        assert_eq!(opened.log_path(), path.join("objects.log"));
    }
}
