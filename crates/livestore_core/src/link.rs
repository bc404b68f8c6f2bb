//! Non-owning references between objects.

use crate::context;
use crate::error::{CoreError, CoreResult};
use crate::id::ObjectId;
use crate::persist::{Load, Persistable};
use crate::store::ObjectStore;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// A reference that does not own its target.
///
/// Only the target id is written to the record and the write batch never
/// walks through a link. Use it for back-references, such as a child
/// pointing at its parent, so loading the child does not drag the parent
/// (and everything the parent owns) along.
pub struct Link<T> {
    id: ObjectId,
    target: RwLock<Weak<T>>,
    store: Option<ObjectStore>,
}

impl<T: Persistable> Link<T> {
    /// Links to a live object.
    #[must_use]
    pub fn to(target: &Arc<T>) -> Self {
        Self {
            id: target.object_id(),
            target: RwLock::new(Arc::downgrade(target)),
            store: context::try_current().map(|tx| tx.store().clone()),
        }
    }
}

impl<T> Link<T> {
    pub(crate) fn unresolved(id: ObjectId, store: ObjectStore) -> Self {
        Self {
            id,
            target: RwLock::new(Weak::new()),
            store: Some(store),
        }
    }

    /// Id of the target.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl<T: Load> Link<T> {
    /// The target, resolved through the store's live objects when this link
    /// has not seen it yet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DanglingLink`] when the target is neither alive
    /// nor loadable.
    pub fn get(&self) -> CoreResult<Arc<T>> {
        if let Some(target) = self.target.read().upgrade() {
            return Ok(target);
        }
        let store = self
            .store
            .as_ref()
            .ok_or(CoreError::DanglingLink { id: self.id })?;
        let target = store
            .resolve::<T>(self.id)
            .map_err(|_| CoreError::DanglingLink { id: self.id })?;
        *self.target.write() = Arc::downgrade(&target);
        Ok(target)
    }
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            target: RwLock::new(self.target.read().clone()),
            store: self.store.clone(),
        }
    }
}

impl<T> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("resolved", &(self.target.read().strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::Backing;

    #[test]
    fn link_follows_a_live_target() {
        let target = Backing::new(vec![1u8]);
        let link = Link::to(&target);
        assert_eq!(link.id(), target.object_id());
        assert!(Arc::ptr_eq(&link.get().unwrap(), &target));
        assert!(Arc::ptr_eq(&link.clone().get().unwrap(), &target));
    }

    #[test]
    fn dropped_unstored_target_dangles() {
        let target = Backing::new(vec![1u8]);
        let link = Link::to(&target);
        drop(target);
        assert!(matches!(link.get(), Err(CoreError::DanglingLink { .. })));
    }

    #[test]
    fn unresolved_link_loads_from_the_store() {
        let store = ObjectStore::in_memory().unwrap();
        let target = Backing::new(vec![5u16]);
        let mut batch = store.begin_batch();
        batch.store(&target).unwrap();
        batch.commit().unwrap();
        let id = target.object_id();
        drop(target);

        let link = Link::<Backing<Vec<u16>>>::unresolved(id, store);
        assert_eq!(*link.get().unwrap().read(), vec![5]);
    }
}
