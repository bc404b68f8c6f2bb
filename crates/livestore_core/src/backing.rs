//! Separately stored field groups.

use crate::error::CoreResult;
use crate::id::ObjectId;
use crate::persist::{Contents, Load, Persistable};
use crate::record::{RecordReader, RecordWriter};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

/// A plain contents value stored as its own object.
///
/// Containers keep their elements in a backing and entities keep their
/// mutable fields in one. The owning entity returns it from
/// [`Entity::additional_to_persist`](crate::Entity::additional_to_persist),
/// so it is stored whenever the entity is dirty and reloaded on rollback.
///
/// The lock here only protects the value itself. Change tracking is the
/// owner's job: mark the owner dirty before taking [`write`](Self::write).
pub struct Backing<C> {
    id: ObjectId,
    contents: RwLock<C>,
}

impl<C: Contents> Backing<C> {
    /// Wraps `contents` under a new object id.
    #[must_use]
    pub fn new(contents: C) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::new(),
            contents: RwLock::new(contents),
        })
    }

    /// Shared access to the contents.
    pub fn read(&self) -> RwLockReadGuard<'_, C> {
        self.contents.read()
    }

    /// Exclusive access to the contents.
    pub fn write(&self) -> RwLockWriteGuard<'_, C> {
        self.contents.write()
    }
}

impl<C: Contents> Persistable for Backing<C> {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn write_flat(&self, record: &mut RecordWriter) -> CoreResult<()> {
        self.contents.read().write_contents(record)
    }

    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()> {
        // Decode before locking: resolving references may load other objects.
        let stored = C::read_contents(record)?;
        *self.contents.write() = stored;
        Ok(())
    }
}

impl<C: Contents> Load for Backing<C> {
    const KIND: &'static str = "backing";

    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>> {
        Ok(Arc::new(Self {
            id,
            contents: RwLock::new(C::read_contents(record)?),
        }))
    }
}

impl<C> fmt::Debug for Backing<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backing").field("id", &self.id).finish_non_exhaustive()
    }
}
