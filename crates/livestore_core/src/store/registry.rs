//! Weak map of live objects, keyed by object id.

use crate::id::ObjectId;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

const MIN_SWEEP: usize = 1024;

type LiveHandle = Weak<dyn Any + Send + Sync>;

/// Remembers which in-memory instance stands for each stored object, so that
/// loading a reference twice yields the same `Arc`.
pub(crate) struct Registry {
    live: Mutex<Live>,
}

struct Live {
    objects: HashMap<ObjectId, LiveHandle>,
    next_sweep: usize,
}

impl Live {
    fn put(&mut self, id: ObjectId, object: &Arc<dyn Any + Send + Sync>) {
        if self.objects.len() >= self.next_sweep {
            self.objects.retain(|_, handle| handle.strong_count() > 0);
            self.next_sweep = (self.objects.len() * 2).max(MIN_SWEEP);
        }
        self.objects.insert(id, Arc::downgrade(object));
    }
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            live: Mutex::new(Live {
                objects: HashMap::new(),
                next_sweep: MIN_SWEEP,
            }),
        }
    }

    /// Returns the live instance for `id` if it is still alive and of type `T`.
    pub(crate) fn get<T: Any + Send + Sync>(&self, id: ObjectId) -> Option<Arc<T>> {
        let upgraded = self.live.lock().objects.get(&id)?.upgrade()?;
        upgraded.downcast::<T>().ok()
    }

    pub(crate) fn insert(&self, id: ObjectId, object: &Arc<dyn Any + Send + Sync>) {
        self.live.lock().put(id, object);
    }

    /// Registers `object` for `id` unless a live instance of `T` is already
    /// there, and returns whichever instance is registered afterwards.
    pub(crate) fn adopt<T: Any + Send + Sync>(&self, id: ObjectId, object: Arc<T>) -> Arc<T> {
        let mut live = self.live.lock();
        let existing = live
            .objects
            .get(&id)
            .and_then(Weak::upgrade)
            .and_then(|handle| handle.downcast::<T>().ok());
        if let Some(existing) = existing {
            return existing;
        }
        let erased: Arc<dyn Any + Send + Sync> = object.clone();
        live.put(id, &erased);
        object
    }

    /// Number of registered objects that are still alive.
    pub(crate) fn alive(&self) -> usize {
        self.live
            .lock()
            .objects
            .values()
            .filter(|handle| handle.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_same_instance_while_alive() {
        let registry = Registry::new();
        let id = ObjectId::new();
        let object: Arc<dyn Any + Send + Sync> = Arc::new(String::from("live"));
        registry.insert(id, &object);

        let first = registry.get::<String>(id).unwrap();
        let second = registry.get::<String>(id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.get::<u64>(id).is_none());

        drop((object, first, second));
        assert!(registry.get::<String>(id).is_none());
        assert_eq!(registry.alive(), 0);
    }

    #[test]
    fn adopt_keeps_the_first_live_instance() {
        let registry = Registry::new();
        let id = ObjectId::new();
        let first = registry.adopt(id, Arc::new(String::from("first")));
        let second = registry.adopt(id, Arc::new(String::from("second")));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, "first");

        drop((first, second));
        let third = registry.adopt(id, Arc::new(String::from("third")));
        assert_eq!(*third, "third");
        assert!(Arc::ptr_eq(&registry.get::<String>(id).unwrap(), &third));
    }
}
