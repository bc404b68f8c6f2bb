//! The durable object store.
//!
//! Objects are persisted as records in an append-only log. An
//! in-memory index maps each object id to its latest committed record, and a
//! registry of weak handles maps ids to the live instances that represent
//! them, so references resolve to one shared `Arc` per object.

mod batch;
mod dir;
mod log;
mod registry;

pub use batch::WriteBatch;

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::id::ObjectId;
use crate::persist::{Load, Persistable};
use crate::record::{Record, RecordReader};
use dir::StoreDir;
use livestore_storage::{FileBackend, InMemoryBackend, StorageBackend};
use log::{ObjectLog, Span};
use parking_lot::{Mutex, RwLock};
use registry::Registry;
use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Counters describing an opened store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Objects with a committed record.
    pub stored_objects: usize,
    /// Registered objects that are currently alive in memory.
    pub live_objects: usize,
    /// Commits in the log, including those replayed on open.
    pub commits: u64,
    /// Records written by the most recent commit.
    pub last_commit_records: usize,
    /// Log size in bytes.
    pub log_bytes: u64,
}

/// Handle to a durable object store. Clones share the same store.
#[derive(Clone)]
pub struct ObjectStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    log: Mutex<ObjectLog>,
    index: RwLock<HashMap<ObjectId, Span>>,
    root: RwLock<Option<ObjectId>>,
    registry: Registry,
    commits: AtomicU64,
    last_commit_records: AtomicUsize,
    dir: Option<StoreDir>,
}

impl ObjectStore {
    /// Opens the store in directory `path`, replaying its log.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreLocked`] if the directory is in use, or an
    /// error if the log cannot be read or is corrupted.
    pub fn open(path: &Path, config: &StoreConfig) -> CoreResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open(&dir.log_path())?;
        Self::from_parts(Box::new(backend), config, Some(dir))
    }

    /// Opens a store over an arbitrary backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend's contents are not a valid log.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: &StoreConfig,
    ) -> CoreResult<Self> {
        Self::from_parts(backend, config, None)
    }

    /// Opens an empty, memory-only store.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other openers.
    pub fn in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), &StoreConfig::default())
    }

    fn from_parts(
        backend: Box<dyn StorageBackend>,
        config: &StoreConfig,
        dir: Option<StoreDir>,
    ) -> CoreResult<Self> {
        let mut log = ObjectLog::new(backend, config.sync_on_commit);
        let replay = log.replay()?;
        info!(
            objects = replay.index.len(),
            commits = replay.commits,
            has_root = replay.root.is_some(),
            "object store opened"
        );
        Ok(Self {
            inner: Arc::new(StoreInner {
                log: Mutex::new(log),
                index: RwLock::new(replay.index),
                root: RwLock::new(replay.root),
                registry: Registry::new(),
                commits: AtomicU64::new(replay.commits),
                last_commit_records: AtomicUsize::new(0),
                dir,
            }),
        })
    }

    /// Directory of a file-backed store.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.dir.as_ref().map(|dir| dir.path().to_path_buf())
    }

    /// Id of the committed root object, if one was ever set.
    #[must_use]
    pub fn root_id(&self) -> Option<ObjectId> {
        *self.inner.root.read()
    }

    /// Loads the root object and everything it strongly references.
    ///
    /// Returns `None` for a store that has never committed a root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or a referenced object cannot be loaded.
    pub fn load_root<R: Load>(&self) -> CoreResult<Option<Arc<R>>> {
        self.root_id().map(|id| self.resolve::<R>(id)).transpose()
    }

    /// Whether `id` has a committed record.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.inner.index.read().contains_key(&id)
    }

    /// Starts an empty batch against this store.
    #[must_use]
    pub fn begin_batch(&self) -> WriteBatch {
        WriteBatch::new(self.clone())
    }

    /// Returns the live instance of `id`, loading it when none is alive.
    ///
    /// Two callers loading the same id at once both get the instance that
    /// was registered first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectNotFound`] for ids without a committed
    /// record, [`CoreError::KindMismatch`] when the record is of another kind,
    /// or any error raised while loading.
    pub fn resolve<T: Load>(&self, id: ObjectId) -> CoreResult<Arc<T>> {
        if let Some(live) = self.inner.registry.get::<T>(id) {
            return Ok(live);
        }
        let record = self.read_record(id, T::KIND)?;
        let mut reader = RecordReader::new(id, record.fields, self);
        let object = T::load(id, &mut reader)?;
        Ok(self.inner.registry.adopt(id, object))
    }

    pub(crate) fn adopt<T: Any + Send + Sync>(&self, id: ObjectId, object: Arc<T>) -> Arc<T> {
        self.inner.registry.adopt(id, object)
    }

    /// Returns the live instance of `id` without loading anything.
    #[must_use]
    pub fn live<T: Any + Send + Sync>(&self, id: ObjectId) -> Option<Arc<T>> {
        self.inner.registry.get::<T>(id)
    }

    /// Overwrites `object`'s own fields with its last committed record.
    ///
    /// Does not recurse into referenced objects; references are re-linked to
    /// their live instances. Objects that were never committed are left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or does not match.
    pub fn reload_flat<P: Persistable + ?Sized>(&self, object: &P) -> CoreResult<()> {
        let id = object.object_id();
        if !self.contains(id) {
            return Ok(());
        }
        let record = self.read_record(id, object.kind())?;
        let mut reader = RecordReader::new(id, record.fields, self);
        object.reload_flat(&mut reader)
    }

    pub(crate) fn read_record(&self, id: ObjectId, expected: &'static str) -> CoreResult<Record> {
        let span = self
            .inner
            .index
            .read()
            .get(&id)
            .copied()
            .ok_or(CoreError::ObjectNotFound { id })?;
        let bytes = self.inner.log.lock().read(span)?;
        let record = Record::decode(&bytes)?;
        if record.kind != expected {
            return Err(CoreError::KindMismatch {
                id,
                expected,
                actual: record.kind,
            });
        }
        Ok(record)
    }

    fn append(
        &self,
        objects: &[(ObjectId, Vec<u8>)],
        root: Option<ObjectId>,
    ) -> CoreResult<Vec<(ObjectId, Span)>> {
        self.inner.log.lock().append_batch(objects, root)
    }

    fn publish(
        &self,
        spans: Vec<(ObjectId, Span)>,
        root: Option<ObjectId>,
        live: Vec<(ObjectId, Arc<dyn Any + Send + Sync>)>,
    ) {
        let records = spans.len();
        self.inner.index.write().extend(spans);
        if root.is_some() {
            *self.inner.root.write() = root;
        }
        for (id, object) in &live {
            self.inner.registry.insert(*id, object);
        }
        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        self.inner
            .last_commit_records
            .store(records, Ordering::SeqCst);
    }

    /// Forces the log to stable media.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot sync.
    pub fn sync(&self) -> CoreResult<()> {
        self.inner.log.lock().sync()
    }

    /// Current counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be read.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        Ok(StoreStats {
            stored_objects: self.inner.index.read().len(),
            live_objects: self.inner.registry.alive(),
            commits: self.inner.commits.load(Ordering::SeqCst),
            last_commit_records: self.inner.last_commit_records.load(Ordering::SeqCst),
            log_bytes: self.inner.log.lock().size()?,
        })
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("root", &self.root_id())
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}
