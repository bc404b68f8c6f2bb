use super::Tracked;
use crate::entity::{self, Entity, EntityState};
use crate::error::{CoreError, CoreResult};
use crate::id::ObjectId;
use crate::persist::{Element, Load, Persistable};
use crate::record::{RecordReader, RecordWriter};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::Arc;

/// An ordered, transactional list.
pub struct TxList<T: Element> {
    tracked: Tracked<Vec<T>>,
}

fn out_of_bounds(index: usize, len: usize) -> CoreError {
    CoreError::IndexOutOfBounds { index, len }
}

impl<T: Element> TxList<T> {
    /// Creates an empty list in the bound write transaction.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn new() -> CoreResult<Arc<Self>> {
        Self::from_vec(Vec::new())
    }

    /// Creates a list holding `items`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn from_vec(items: Vec<T>) -> CoreResult<Arc<Self>> {
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
        self.tracked.read(Vec::len)
    }

    /// Whether the list is empty.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.tracked.read(Vec::is_empty)
    }

    /// The element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfBounds`] past the end, or an error when
    /// no live transaction is bound.
    pub fn get(&self, index: usize) -> CoreResult<T> {
        self.tracked.read(|items| {
            items
                .get(index)
                .cloned()
                .ok_or_else(|| out_of_bounds(index, items.len()))
        })?
    }

    /// The first element, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn first(&self) -> CoreResult<Option<T>> {
        self.tracked.read(|items| items.first().cloned())
    }

    /// The last element, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn last(&self) -> CoreResult<Option<T>> {
        self.tracked.read(|items| items.last().cloned())
    }

    /// A copy of the elements in `range`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfBounds`] when the range does not fit,
    /// or an error when no live transaction is bound.
    pub fn slice(&self, range: Range<usize>) -> CoreResult<Vec<T>> {
        self.tracked.read(|items| {
            if range.start > range.end {
                return Err(out_of_bounds(range.start, range.end));
            }
            items
                .get(range.clone())
                .map(<[T]>::to_vec)
                .ok_or_else(|| out_of_bounds(range.end, items.len()))
        })?
    }

    /// A copy of all elements.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn to_vec(&self) -> CoreResult<Vec<T>> {
        self.tracked.read(Vec::clone)
    }

    /// Iterates over a snapshot of the elements.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn iter(&self) -> CoreResult<std::vec::IntoIter<T>> {
        self.to_vec().map(Vec::into_iter)
    }

    /// A cursor positioned before the first element.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn cursor(&self) -> CoreResult<ListCursor<'_, T>> {
        self.tracked.state.require_read_access()?;
        Ok(ListCursor {
            list: self,
            next: 0,
            last: None,
        })
    }

    /// Appends `item`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn push(&self, item: T) -> CoreResult<()> {
        self.tracked.modify(|items| items.push(item))
    }

    /// Prepends `item`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn push_front(&self, item: T) -> CoreResult<()> {
        self.tracked.modify(|items| items.insert(0, item))
    }

    /// Inserts `item` at `index`, shifting later elements.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfBounds`] when `index > len`, or an
    /// error when no writable transaction is bound.
    pub fn insert(&self, index: usize, item: T) -> CoreResult<()> {
        self.tracked.modify(|items| {
            if index > items.len() {
                return Err(out_of_bounds(index, items.len()));
            }
            items.insert(index, item);
            Ok(())
        })?
    }

    /// Replaces the element at `index` and returns the old one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfBounds`] past the end, or an error when
    /// no writable transaction is bound.
    pub fn set(&self, index: usize, item: T) -> CoreResult<T> {
        self.tracked.modify(|items| {
            let len = items.len();
            items
                .get_mut(index)
                .map(|slot| std::mem::replace(slot, item))
                .ok_or_else(|| out_of_bounds(index, len))
        })?
    }

    /// Appends every item of `iter`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn extend(&self, iter: impl IntoIterator<Item = T>) -> CoreResult<()> {
        let added: Vec<T> = iter.into_iter().collect();
        self.tracked.modify(|items| items.extend(added))
    }

    /// Inserts every item of `iter` at `index`, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfBounds`] when `index > len`, or an
    /// error when no writable transaction is bound.
    pub fn insert_all(&self, index: usize, iter: impl IntoIterator<Item = T>) -> CoreResult<()> {
        let added: Vec<T> = iter.into_iter().collect();
        self.tracked.modify(|items| {
            if index > items.len() {
                return Err(out_of_bounds(index, items.len()));
            }
            items.splice(index..index, added);
            Ok(())
        })?
    }

    /// Removes and returns the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfBounds`] past the end, or an error when
    /// no writable transaction is bound.
    pub fn remove(&self, index: usize) -> CoreResult<T> {
        self.tracked.modify(|items| {
            if index >= items.len() {
                return Err(out_of_bounds(index, items.len()));
            }
            Ok(items.remove(index))
        })?
    }

    /// Removes and returns the last element.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn pop(&self) -> CoreResult<Option<T>> {
        self.tracked.modify(Vec::pop)
    }

    /// Removes and returns the first element.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn pop_front(&self) -> CoreResult<Option<T>> {
        self.tracked
            .modify(|items| (!items.is_empty()).then(|| items.remove(0)))
    }

    /// Keeps only the elements for which `keep` returns `true`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn retain(&self, keep: impl FnMut(&T) -> bool) -> CoreResult<()> {
        self.tracked.modify(|items| items.retain(keep))
    }

    /// Removes every element.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn clear(&self) -> CoreResult<()> {
        self.tracked.modify(Vec::clear)
    }

    /// Replaces each element with `map(element)`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn replace_all(&self, mut map: impl FnMut(&T) -> T) -> CoreResult<()> {
        self.tracked.modify(|items| {
            for item in items.iter_mut() {
                *item = map(item);
            }
        })
    }

    /// Sorts the list with `compare`. The sort is stable.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> Ordering) -> CoreResult<()> {
        self.tracked.modify(|items| items.sort_by(compare))
    }
}

impl<T: Element + PartialEq> TxList<T> {
    /// Whether `item` is in the list.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn contains(&self, item: &T) -> CoreResult<bool> {
        self.tracked.read(|items| items.contains(item))
    }

    /// Whether every item of `iter` is in the list.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn contains_all<'i>(&self, iter: impl IntoIterator<Item = &'i T>) -> CoreResult<bool> {
        self.tracked
            .read(|items| iter.into_iter().all(|item| items.contains(item)))
    }

    /// Index of the first element equal to `item`.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn index_of(&self, item: &T) -> CoreResult<Option<usize>> {
        self.tracked
            .read(|items| items.iter().position(|candidate| candidate == item))
    }

    /// Index of the last element equal to `item`.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn last_index_of(&self, item: &T) -> CoreResult<Option<usize>> {
        self.tracked
            .read(|items| items.iter().rposition(|candidate| candidate == item))
    }

    /// Removes the first element equal to `item`. Returns whether one was
    /// found.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn remove_item(&self, item: &T) -> CoreResult<bool> {
        self.tracked.modify(|items| {
            match items.iter().position(|candidate| candidate == item) {
                Some(index) => {
                    items.remove(index);
                    true
                }
                None => false,
            }
        })
    }

    /// Removes every element that equals one of `removed`. Returns whether
    /// the list changed.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn remove_all(&self, removed: impl IntoIterator<Item = T>) -> CoreResult<bool> {
        let removed: Vec<T> = removed.into_iter().collect();
        self.tracked.modify(|items| {
            let before = items.len();
            items.retain(|item| !removed.contains(item));
            items.len() != before
        })
    }

    /// Keeps only the elements that equal one of `kept`. Returns whether the
    /// list changed.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn retain_all(&self, kept: impl IntoIterator<Item = T>) -> CoreResult<bool> {
        let kept: Vec<T> = kept.into_iter().collect();
        self.tracked.modify(|items| {
            let before = items.len();
            items.retain(|item| kept.contains(item));
            items.len() != before
        })
    }
}

impl<T: Element + Ord> TxList<T> {
    /// Sorts the list in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn sort(&self) -> CoreResult<()> {
        self.tracked.modify(|items| items.sort())
    }
}

impl<T: Element> Entity for TxList<T> {
    fn entity_state(&self) -> &EntityState {
        &self.tracked.state
    }

    fn additional_to_persist(&self) -> Vec<Arc<dyn Persistable>> {
        self.tracked.additional()
    }
}

impl<T: Element> Persistable for TxList<T> {
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

impl<T: Element> Load for TxList<T> {
    const KIND: &'static str = "list";

    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>> {
        let items = record.reference()?;
        Ok(entity::restore(id, |state| Self {
            tracked: Tracked { state, items },
        }))
    }
}

impl<T: Element> PartialEq for TxList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.object_id() == other.object_id()
    }
}

impl<T: Element> Eq for TxList<T> {}

impl<T: Element> Hash for TxList<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.object_id().hash(state);
    }
}

impl<T: Element> fmt::Debug for TxList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxList")
            .field("id", &self.object_id())
            .field("state", &self.tracked.state.save_state())
            .finish_non_exhaustive()
    }
}

/// A bidirectional cursor over a [`TxList`].
///
/// Moving reads the live list, so changes made through the cursor are seen
/// by later moves. [`remove`](Self::remove) and [`set`](Self::set) act on the
/// element returned last by `next` or [`previous`](Self::previous).
///
/// Every move checks the list's transaction. Used as an [`Iterator`], the
/// cursor ends when no live transaction is bound; [`try_next`](Self::try_next)
/// and [`try_previous`](Self::try_previous) report the error instead.
pub struct ListCursor<'a, T: Element> {
    list: &'a TxList<T>,
    next: usize,
    last: Option<usize>,
}

impl<T: Element> ListCursor<'_, T> {
    /// Index of the element `next` would return.
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Whether `next` would return an element. False when no live
    /// transaction is bound.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.list
            .tracked
            .read(|items| self.next < items.len())
            .unwrap_or(false)
    }

    /// Whether [`previous`](Self::previous) would return an element.
    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.next > 0 && self.list.tracked.state.require_read_access().is_ok()
    }

    /// Steps forward and returns the element passed over.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn try_next(&mut self) -> CoreResult<Option<T>> {
        let index = self.next;
        let item = self.list.tracked.read(|items| items.get(index).cloned())?;
        if item.is_some() {
            self.last = Some(index);
            self.next += 1;
        }
        Ok(item)
    }

    /// Steps back and returns the element passed over.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn try_previous(&mut self) -> CoreResult<Option<T>> {
        let Some(index) = self.next.checked_sub(1) else {
            return Ok(None);
        };
        let item = self.list.tracked.read(|items| items.get(index).cloned())?;
        if item.is_some() {
            self.next = index;
            self.last = Some(index);
        }
        Ok(item)
    }

    /// Steps back and returns the element passed over. `None` at the front
    /// or when no live transaction is bound.
    pub fn previous(&mut self) -> Option<T> {
        self.try_previous().ok().flatten()
    }

    fn current(&self, operation: &str) -> CoreResult<usize> {
        self.last.ok_or_else(|| {
            CoreError::invalid_operation(format!("cursor {operation} without a current element"))
        })
    }

    /// Removes the element returned last.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] when there is no such element,
    /// or an error when no writable transaction is bound.
    pub fn remove(&mut self) -> CoreResult<T> {
        let index = self.current("remove")?;
        let removed = self.list.remove(index)?;
        if index < self.next {
            self.next -= 1;
        }
        self.last = None;
        Ok(removed)
    }

    /// Replaces the element returned last.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] when there is no such element,
    /// or an error when no writable transaction is bound.
    pub fn set(&mut self, item: T) -> CoreResult<()> {
        let index = self.current("set")?;
        self.list.set(index, item).map(drop)
    }

    /// Inserts `item` before the element `next` would return. A following
    /// `next` is unaffected.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn insert(&mut self, item: T) -> CoreResult<()> {
        self.list.insert(self.next, item)?;
        self.next += 1;
        self.last = None;
        Ok(())
    }
}

impl<T: Element> Iterator for ListCursor<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.try_next().ok().flatten()
    }
}
