use super::Tracked;
use crate::entity::{self, Entity, EntityState};
use crate::error::{CoreError, CoreResult};
use crate::id::ObjectId;
use crate::persist::{Element, Load, Persistable};
use crate::record::{RecordReader, RecordWriter};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An unordered, transactional set.
pub struct TxSet<T: Element + Eq + Hash> {
    tracked: Tracked<HashSet<T>>,
}

impl<T: Element + Eq + Hash> TxSet<T> {
    /// Creates an empty set in the bound write transaction.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn new() -> CoreResult<Arc<Self>> {
        Self::from_items(HashSet::new())
    }

    /// Creates a set holding `items`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn from_items(items: HashSet<T>) -> CoreResult<Arc<Self>> {
        entity::create(|state| Self {
            tracked: Tracked::new(state, items),
        })
    }

    /// Number of elements.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn len(&self) -> CoreResult<usize> {
        self.tracked.read(HashSet::len)
    }

    /// Whether the set is empty.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.tracked.read(HashSet::is_empty)
    }

    /// Whether `item` is in the set.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn contains(&self, item: &T) -> CoreResult<bool> {
        self.tracked.read(|items| items.contains(item))
    }

    /// Whether every item of `iter` is in the set.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn contains_all<'i>(&self, iter: impl IntoIterator<Item = &'i T>) -> CoreResult<bool> {
        self.tracked
            .read(|items| iter.into_iter().all(|item| items.contains(item)))
    }

    /// A copy of the elements, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn to_vec(&self) -> CoreResult<Vec<T>> {
        self.tracked.read(|items| items.iter().cloned().collect())
    }

    /// Iterates over a snapshot of the elements.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn iter(&self) -> CoreResult<std::vec::IntoIter<T>> {
        self.to_vec().map(Vec::into_iter)
    }

    /// A cursor over a snapshot of the elements that can remove them from
    /// the set.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn cursor(&self) -> CoreResult<SetCursor<'_, T>> {
        Ok(SetCursor {
            set: self,
            items: self.to_vec()?.into_iter(),
            last: None,
        })
    }

    /// Adds `item`. Returns whether it was new.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn insert(&self, item: T) -> CoreResult<bool> {
        self.tracked.modify(|items| items.insert(item))
    }

    /// Removes `item`. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn remove(&self, item: &T) -> CoreResult<bool> {
        self.tracked.modify(|items| items.remove(item))
    }

    /// Adds every item of `iter`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn extend(&self, iter: impl IntoIterator<Item = T>) -> CoreResult<()> {
        let added: Vec<T> = iter.into_iter().collect();
        self.tracked.modify(|items| items.extend(added))
    }

    /// Keeps only the elements for which `keep` returns `true`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn retain(&self, keep: impl FnMut(&T) -> bool) -> CoreResult<()> {
        self.tracked.modify(|items| items.retain(keep))
    }

    /// Removes every item of `removed`. Returns whether the set changed.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn remove_all(&self, removed: impl IntoIterator<Item = T>) -> CoreResult<bool> {
        let removed: Vec<T> = removed.into_iter().collect();
        self.tracked.modify(|items| {
            let before = items.len();
            for item in &removed {
                items.remove(item);
            }
            items.len() != before
        })
    }

    /// Keeps only the items of `kept`. Returns whether the set changed.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn retain_all(&self, kept: impl IntoIterator<Item = T>) -> CoreResult<bool> {
        let kept: HashSet<T> = kept.into_iter().collect();
        self.tracked.modify(|items| {
            let before = items.len();
            items.retain(|item| kept.contains(item));
            items.len() != before
        })
    }

    /// Removes every element.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn clear(&self) -> CoreResult<()> {
        self.tracked.modify(HashSet::clear)
    }
}

impl<T: Element + Eq + Hash> Entity for TxSet<T> {
    fn entity_state(&self) -> &EntityState {
        &self.tracked.state
    }

    fn additional_to_persist(&self) -> Vec<Arc<dyn Persistable>> {
        self.tracked.additional()
    }
}

impl<T: Element + Eq + Hash> Persistable for TxSet<T> {
    fn object_id(&self) -> ObjectId {
        self.tracked.state.object_id()
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn write_flat(&self, record: &mut RecordWriter) -> CoreResult<()> {
        self.tracked.write_flat(record);
        Ok(())
    }

    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()> {
        self.tracked.reload_flat(record)
    }
}

impl<T: Element + Eq + Hash> Load for TxSet<T> {
    const KIND: &'static str = "set";

    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>> {
        let items = record.reference()?;
        Ok(entity::restore(id, |state| Self {
            tracked: Tracked { state, items },
        }))
    }
}

impl<T: Element + Eq + Hash> PartialEq for TxSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.object_id() == other.object_id()
    }
}

impl<T: Element + Eq + Hash> Eq for TxSet<T> {}

impl<T: Element + Eq + Hash> Hash for TxSet<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.object_id().hash(state);
    }
}

impl<T: Element + Eq + Hash> fmt::Debug for TxSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxSet")
            .field("id", &self.object_id())
            .field("state", &self.tracked.state.save_state())
            .finish_non_exhaustive()
    }
}

/// A cursor over a snapshot of a [`TxSet`]. It ends early when no live
/// transaction is bound.
pub struct SetCursor<'a, T: Element + Eq + Hash> {
    set: &'a TxSet<T>,
    items: std::vec::IntoIter<T>,
    last: Option<T>,
}

impl<T: Element + Eq + Hash> SetCursor<'_, T> {
    /// Removes the element returned last from the set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] when there is no such element,
    /// or an error when no writable transaction is bound.
    pub fn remove(&mut self) -> CoreResult<()> {
        let item = self.last.take().ok_or_else(|| {
            CoreError::invalid_operation("cursor remove without a current element")
        })?;
        self.set.remove(&item).map(drop)
    }
}

impl<T: Element + Eq + Hash> Iterator for SetCursor<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.set.tracked.state.require_read_access().ok()?;
        let item = self.items.next()?;
        self.last = Some(item.clone());
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::bind;
    use crate::id::TransactionId;
    use crate::store::ObjectStore;
    use crate::transaction::{Lifecycle, Transaction};

    fn in_write_scope(test: impl FnOnce()) {
        let store = ObjectStore::in_memory().unwrap();
        let tx = Arc::new(Transaction::new(TransactionId(1), Lifecycle::Exclusive, store));
        tx.set_writable(true);
        let _scope = bind(tx);
        test();
    }

    #[test]
    fn set_operations() {
        in_write_scope(|| {
            let set = TxSet::new().unwrap();
            assert!(set.insert("a".to_owned()).unwrap());
            assert!(!set.insert("a".to_owned()).unwrap());
            set.extend(["b".to_owned(), "c".to_owned(), "d".to_owned()])
                .unwrap();
            assert_eq!(set.len().unwrap(), 4);
            assert!(set.contains(&"b".to_owned()).unwrap());
            assert!(set
                .contains_all(&["a".to_owned(), "d".to_owned()])
                .unwrap());
            assert!(set.remove(&"a".to_owned()).unwrap());
            assert!(!set.remove(&"a".to_owned()).unwrap());
            assert!(set.remove_all(["b".to_owned(), "x".to_owned()]).unwrap());
            assert!(set.retain_all(["c".to_owned()]).unwrap());
            let mut left = set.to_vec().unwrap();
            left.sort();
            assert_eq!(left, vec!["c".to_owned()]);
            set.retain(|item| item != "c").unwrap();
            assert!(set.is_empty().unwrap());
            set.insert("z".to_owned()).unwrap();
            set.clear().unwrap();
            assert_eq!(set.iter().unwrap().count(), 0);
        });
    }

    #[test]
    fn cursor_removes_returned_elements() {
        in_write_scope(|| {
            let set = TxSet::from_items((1..=4u32).collect()).unwrap();
            let mut cursor = set.cursor().unwrap();
            assert!(matches!(cursor.remove(), Err(CoreError::InvalidOperation { .. })));
            while let Some(n) = cursor.next() {
                if n % 2 == 0 {
                    cursor.remove().unwrap();
                }
            }
            let mut left = set.to_vec().unwrap();
            left.sort_unstable();
            assert_eq!(left, vec![1, 3]);
        });
    }

    #[test]
    fn cursor_ends_outside_a_scope() {
        let store = ObjectStore::in_memory().unwrap();
        let tx = Arc::new(Transaction::new(TransactionId(1), Lifecycle::Exclusive, store));
        tx.set_writable(true);
        let scope = bind(tx);
        let set = TxSet::from_items(HashSet::from([1u32, 2])).unwrap();
        let mut cursor = set.cursor().unwrap();
        assert!(cursor.next().is_some());
        drop(scope);

        assert_eq!(cursor.next(), None);
    }
}
