//! Values loaded on first access.

use crate::context;
use crate::error::{CoreError, CoreResult};
use crate::id::ObjectId;
use crate::persist::Persistable;
use crate::record::{RecordReader, RecordWriter};
use crate::store::ObjectStore;
use crate::transaction::Unload;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

const KIND: &str = "lazy";

/// Types that can be held by a [`Lazy`] handle.
pub trait LazyValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static> LazyValue for T {}

/// A single value persisted as its own object and kept out of memory until
/// asked for.
///
/// Loading an owner yields an unloaded handle; [`get`](Lazy::get) reads the
/// value from the store. A handle made outside any transaction learns its
/// store when a write batch first stores it. Once the value is durably stored
/// it can be evicted again with [`clear`](Lazy::clear), or by
/// [`Transaction::defer_unload`](crate::Transaction::defer_unload).
pub struct Lazy<T> {
    id: ObjectId,
    store: RwLock<Option<ObjectStore>>,
    value: Mutex<Option<T>>,
}

impl<T: LazyValue> Lazy<T> {
    /// Wraps a new value. The handle remembers the store of the bound
    /// transaction, if any, to load from after eviction.
    #[must_use]
    pub fn new(value: T) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::new(),
            store: RwLock::new(context::try_current().map(|tx| tx.store().clone())),
            value: Mutex::new(Some(value)),
        })
    }

    pub(crate) fn unloaded(id: ObjectId, store: ObjectStore) -> Arc<Self> {
        if let Some(live) = store.live::<Self>(id) {
            return live;
        }
        let handle = Arc::new(Self {
            id,
            store: RwLock::new(Some(store.clone())),
            value: Mutex::new(None),
        });
        store.adopt(id, handle)
    }

    /// The value, loading it from the store when it is not in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has to be loaded and cannot be.
    pub fn get(&self) -> CoreResult<T> {
        let mut value = self.value.lock();
        if let Some(loaded) = value.as_ref() {
            return Ok(loaded.clone());
        }
        let loaded = self.load()?;
        *value = Some(loaded.clone());
        Ok(loaded)
    }

    fn load(&self) -> CoreResult<T> {
        let store = self
            .store
            .read()
            .clone()
            .ok_or(CoreError::ObjectNotFound { id: self.id })?;
        let record = store.read_record(self.id, KIND)?;
        let mut reader = RecordReader::new(self.id, record.fields, &store);
        reader.value()
    }

    /// Whether the value is in memory.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.value.lock().is_some()
    }

    /// Whether the value has a committed record.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        self.store
            .read()
            .as_ref()
            .is_some_and(|store| store.contains(self.id))
    }

    /// Evicts the value from memory if it is stored. Returns whether it did.
    pub fn clear(&self) -> bool {
        if !self.is_stored() {
            return false;
        }
        self.value.lock().take().is_some()
    }
}

impl<T: LazyValue> Persistable for Lazy<T> {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn write_flat(&self, record: &mut RecordWriter) -> CoreResult<()> {
        let value = self.get()?;
        record.value(&value)?;
        Ok(())
    }

    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()> {
        let stored: T = record.value()?;
        *self.value.lock() = Some(stored);
        Ok(())
    }

    fn attach(&self, store: &ObjectStore) {
        let mut bound = self.store.write();
        if bound.is_none() {
            *bound = Some(store.clone());
        }
    }
}

impl<T: LazyValue> Unload for Lazy<T> {
    fn is_stored(&self) -> bool {
        Lazy::is_stored(self)
    }

    fn unload(&self) -> bool {
        self.clear()
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("id", &self.id)
            .field("loaded", &self.value.lock().is_some())
            .finish()
    }
}
