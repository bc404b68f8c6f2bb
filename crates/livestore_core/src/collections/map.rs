use super::Tracked;
use crate::entity::{self, Entity, EntityState};
use crate::error::{CoreError, CoreResult};
use crate::id::ObjectId;
use crate::persist::{Element, Load, Persistable};
use crate::record::{RecordReader, RecordWriter};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A transactional hash map.
pub struct TxMap<K: Element + Eq + Hash, V: Element> {
    tracked: Tracked<HashMap<K, V>>,
}

impl<K: Element + Eq + Hash, V: Element> TxMap<K, V> {
    /// Creates an empty map in the bound write transaction.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn new() -> CoreResult<Arc<Self>> {
        Self::from_entries(HashMap::new())
    }

    /// Creates a map holding `entries`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn from_entries(entries: HashMap<K, V>) -> CoreResult<Arc<Self>> {
        entity::create(|state| Self {
            tracked: Tracked::new(state, entries),
        })
    }

    /// Number of entries.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn len(&self) -> CoreResult<usize> {
        self.tracked.read(HashMap::len)
    }

    /// Whether the map is empty.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.tracked.read(HashMap::is_empty)
    }

    /// Whether `key` has an entry.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn contains_key(&self, key: &K) -> CoreResult<bool> {
        self.tracked.read(|entries| entries.contains_key(key))
    }

    /// The value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn get(&self, key: &K) -> CoreResult<Option<V>> {
        self.tracked.read(|entries| entries.get(key).cloned())
    }

    /// A copy of the keys, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn keys(&self) -> CoreResult<Vec<K>> {
        self.tracked.read(|entries| entries.keys().cloned().collect())
    }

    /// A copy of the values, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn values(&self) -> CoreResult<Vec<V>> {
        self.tracked.read(|entries| entries.values().cloned().collect())
    }

    /// A copy of the entries, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn entries(&self) -> CoreResult<Vec<(K, V)>> {
        self.tracked.read(|entries| {
            entries
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
    }

    /// A cursor over a snapshot of the entries that can change or remove
    /// them in the map.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn cursor(&self) -> CoreResult<MapCursor<'_, K, V>> {
        Ok(MapCursor {
            map: self,
            entries: self.entries()?.into_iter(),
            last: None,
        })
    }

    /// Stores `value` under `key` and returns the previous value.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn insert(&self, key: K, value: V) -> CoreResult<Option<V>> {
        self.tracked.modify(|entries| entries.insert(key, value))
    }

    /// Removes the entry for `key` and returns its value.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn remove(&self, key: &K) -> CoreResult<Option<V>> {
        self.tracked.modify(|entries| entries.remove(key))
    }

    /// Stores every entry of `iter`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn extend(&self, iter: impl IntoIterator<Item = (K, V)>) -> CoreResult<()> {
        let added: Vec<(K, V)> = iter.into_iter().collect();
        self.tracked.modify(|entries| entries.extend(added))
    }

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn clear(&self) -> CoreResult<()> {
        self.tracked.modify(HashMap::clear)
    }

    /// Keeps only the entries for which `keep` returns `true`. `keep` may
    /// change the values it is shown.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn retain(&self, keep: impl FnMut(&K, &mut V) -> bool) -> CoreResult<()> {
        self.tracked.modify(|entries| entries.retain(keep))
    }

    /// Replaces each value with `map(key, value)`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn replace_all(&self, mut map: impl FnMut(&K, &V) -> V) -> CoreResult<()> {
        self.tracked.modify(|entries| {
            for (key, value) in entries.iter_mut() {
                *value = map(key, value);
            }
        })
    }

    /// Stores `value` unless `key` already has an entry. Returns the value
    /// that was already there.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn insert_if_absent(&self, key: K, value: V) -> CoreResult<Option<V>> {
        self.tracked.modify(|entries| match entries.entry(key) {
            Entry::Occupied(existing) => Some(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(value);
                None
            }
        })
    }

    /// Replaces the value for `key` only if it has an entry. Returns the
    /// previous value.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn replace(&self, key: &K, value: V) -> CoreResult<Option<V>> {
        self.tracked.modify(|entries| {
            entries
                .get_mut(key)
                .map(|slot| std::mem::replace(slot, value))
        })
    }

    /// Stores the value computed from `key` unless it already has an entry.
    /// Returns the value now stored, if any. Nothing is stored when
    /// `compute` returns `None`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn compute_if_absent(
        &self,
        key: K,
        compute: impl FnOnce(&K) -> Option<V>,
    ) -> CoreResult<Option<V>> {
        self.tracked.modify(|entries| match entries.entry(key) {
            Entry::Occupied(existing) => Some(existing.get().clone()),
            Entry::Vacant(slot) => {
                let value = compute(slot.key())?;
                Some(slot.insert(value).clone())
            }
        })
    }

    /// Recomputes the value for `key` if it has an entry. The entry is
    /// removed when `compute` returns `None`. Returns the new value.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn compute_if_present(
        &self,
        key: &K,
        compute: impl FnOnce(&K, &V) -> Option<V>,
    ) -> CoreResult<Option<V>> {
        self.tracked.modify(|entries| {
            let current = entries.get(key)?;
            match compute(key, current) {
                Some(value) => {
                    entries.insert(key.clone(), value.clone());
                    Some(value)
                }
                None => {
                    entries.remove(key);
                    None
                }
            }
        })
    }

    /// Computes the value for `key` from its current value, if any. The
    /// entry is removed when `compute` returns `None`. Returns the new value.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn compute(
        &self,
        key: K,
        compute: impl FnOnce(&K, Option<&V>) -> Option<V>,
    ) -> CoreResult<Option<V>> {
        self.tracked.modify(|entries| {
            match compute(&key, entries.get(&key)) {
                Some(value) => {
                    entries.insert(key, value.clone());
                    Some(value)
                }
                None => {
                    entries.remove(&key);
                    None
                }
            }
        })
    }

    /// Stores `value` when `key` has no entry, otherwise stores
    /// `combine(current, value)`. The entry is removed when `combine`
    /// returns `None`. Returns the new value.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn merge(
        &self,
        key: K,
        value: V,
        combine: impl FnOnce(&V, V) -> Option<V>,
    ) -> CoreResult<Option<V>> {
        self.tracked.modify(|entries| match entries.entry(key) {
            Entry::Vacant(slot) => Some(slot.insert(value).clone()),
            Entry::Occupied(mut existing) => match combine(existing.get(), value) {
                Some(merged) => {
                    existing.insert(merged.clone());
                    Some(merged)
                }
                None => {
                    existing.remove();
                    None
                }
            },
        })
    }
}

impl<K: Element + Eq + Hash, V: Element + PartialEq> TxMap<K, V> {
    /// Whether any entry holds `value`.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn contains_value(&self, value: &V) -> CoreResult<bool> {
        self.tracked
            .read(|entries| entries.values().any(|candidate| candidate == value))
    }

    /// Removes the entry for `key` only if it holds `value`. Returns whether
    /// it did.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn remove_if_eq(&self, key: &K, value: &V) -> CoreResult<bool> {
        self.tracked.modify(|entries| {
            if entries.get(key) == Some(value) {
                entries.remove(key);
                true
            } else {
                false
            }
        })
    }

    /// Replaces the value for `key` with `new` only if it currently holds
    /// `old`. Returns whether it did.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn replace_if_eq(&self, key: &K, old: &V, new: V) -> CoreResult<bool> {
        self.tracked.modify(|entries| match entries.get_mut(key) {
            Some(slot) if slot == old => {
                *slot = new;
                true
            }
            _ => false,
        })
    }
}

impl<K: Element + Eq + Hash, V: Element> Entity for TxMap<K, V> {
    fn entity_state(&self) -> &EntityState {
        &self.tracked.state
    }

    fn additional_to_persist(&self) -> Vec<Arc<dyn Persistable>> {
        self.tracked.additional()
    }
}

impl<K: Element + Eq + Hash, V: Element> Persistable for TxMap<K, V> {
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

impl<K: Element + Eq + Hash, V: Element> Load for TxMap<K, V> {
    const KIND: &'static str = "map";

    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>> {
        let items = record.reference()?;
        Ok(entity::restore(id, |state| Self {
            tracked: Tracked { state, items },
        }))
    }
}

impl<K: Element + Eq + Hash, V: Element> PartialEq for TxMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.object_id() == other.object_id()
    }
}

impl<K: Element + Eq + Hash, V: Element> Eq for TxMap<K, V> {}

impl<K: Element + Eq + Hash, V: Element> Hash for TxMap<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.object_id().hash(state);
    }
}

impl<K: Element + Eq + Hash, V: Element> fmt::Debug for TxMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxMap")
            .field("id", &self.object_id())
            .field("state", &self.tracked.state.save_state())
            .finish_non_exhaustive()
    }
}

/// A cursor over a snapshot of a [`TxMap`]'s entries. It ends early when no live
/// transaction is bound.
pub struct MapCursor<'a, K: Element + Eq + Hash, V: Element> {
    map: &'a TxMap<K, V>,
    entries: std::vec::IntoIter<(K, V)>,
    last: Option<K>,
}

impl<K: Element + Eq + Hash, V: Element> MapCursor<'_, K, V> {
    fn current(&self, operation: &str) -> CoreResult<&K> {
        self.last.as_ref().ok_or_else(|| {
            CoreError::invalid_operation(format!("cursor {operation} without a current entry"))
        })
    }

    /// Removes the entry returned last from the map.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] when there is no such entry,
    /// or an error when no writable transaction is bound.
    pub fn remove(&mut self) -> CoreResult<()> {
        self.current("remove")?;
        if let Some(key) = self.last.take() {
            self.map.remove(&key)?;
        }
        Ok(())
    }

    /// Replaces the value of the entry returned last.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] when there is no such entry or
    /// its key has since been removed from the map, or an error when no
    /// writable transaction is bound.
    pub fn set_value(&mut self, value: V) -> CoreResult<()> {
        let key = self.current("set_value")?;
        match self.map.replace(key, value)? {
            Some(_) => Ok(()),
            None => Err(CoreError::invalid_operation(
                "cursor set_value on an entry no longer in the map",
            )),
        }
    }
}

impl<K: Element + Eq + Hash, V: Element> Iterator for MapCursor<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        self.map.tracked.state.require_read_access().ok()?;
        let entry = self.entries.next()?;
        self.last = Some(entry.0.clone());
        Some(entry)
    }
}
