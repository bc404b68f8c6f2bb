//! Traits connecting live objects to their stored records.

use crate::error::{CoreError, CoreResult};
use crate::id::ObjectId;
use crate::record::{RecordReader, RecordWriter};
use crate::store::ObjectStore;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use uuid::Uuid;

/// Converts a shared object into a type-erased `Arc<dyn Any>`.
///
/// Blanket-implemented for every sized `Send + Sync + 'static` type. The
/// live-object registry uses it to keep weak handles it can downcast later.
pub trait AsAny: Any + Send + Sync {
    /// Erases the concrete type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An object with its own record in the store.
pub trait Persistable: AsAny {
    /// Stable identity of the object.
    fn object_id(&self) -> ObjectId;

    /// Record kind, checked when the record is read back.
    fn kind(&self) -> &'static str;

    /// Writes the object's own fields. Referenced objects are written as
    /// references, never inline.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be encoded.
    fn write_flat(&self, record: &mut RecordWriter) -> CoreResult<()>;

    /// Replaces the object's own fields, in place, with the stored ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not match the object's layout.
    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()>;

    /// Called when a write batch queues the object for `store`.
    fn attach(&self, _store: &ObjectStore) {}
}

/// A persistable type the store can construct from its record.
pub trait Load: Persistable + Sized {
    /// Record kind written for this type.
    const KIND: &'static str;

    /// Builds the object from its record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is malformed or a reference cannot be
    /// resolved.
    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>>;
}

/// A value that can sit inside a transactional container.
///
/// Plain values are written inline. `Arc<T>` of a loadable type is written as
/// an owning reference, so containers of entities keep object identity.
pub trait Element: Clone + Send + Sync + 'static {
    /// Writes the element into the container's record.
    ///
    /// # Errors
    ///
    /// Returns an error if the element cannot be encoded.
    fn write_element(&self, record: &mut RecordWriter) -> CoreResult<()>;

    /// Reads one element back.
    ///
    /// # Errors
    ///
    /// Returns an error if the element cannot be decoded or resolved.
    fn read_element(record: &mut RecordReader<'_>) -> CoreResult<Self>;
}

impl<T: Load> Element for Arc<T> {
    fn write_element(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record.reference(self);
        Ok(())
    }

    fn read_element(record: &mut RecordReader<'_>) -> CoreResult<Self> {
        record.reference::<T>()
    }
}

macro_rules! plain_element {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Element for $ty {
                fn write_element(&self, record: &mut RecordWriter) -> CoreResult<()> {
                    record.value(self)?;
                    Ok(())
                }

                fn read_element(record: &mut RecordReader<'_>) -> CoreResult<Self> {
                    record.value()
                }
            }
        )*
    };
}

plain_element!(String, bool, char, u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, ObjectId);

impl Element for Uuid {
    fn write_element(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record.value(self.as_bytes())?;
        Ok(())
    }

    fn read_element(record: &mut RecordReader<'_>) -> CoreResult<Self> {
        record.value::<[u8; 16]>().map(Uuid::from_bytes)
    }
}

/// The plain contents of a [`Backing`](crate::Backing) object.
pub trait Contents: Send + Sync + 'static {
    /// Writes the contents as record fields.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be encoded.
    fn write_contents(&self, record: &mut RecordWriter) -> CoreResult<()>;

    /// Reads contents written by [`write_contents`](Contents::write_contents).
    ///
    /// # Errors
    ///
    /// Returns an error if the record is malformed.
    fn read_contents(record: &mut RecordReader<'_>) -> CoreResult<Self>
    where
        Self: Sized;
}

fn read_len(record: &mut RecordReader<'_>) -> CoreResult<usize> {
    let len: u64 = record.value()?;
    usize::try_from(len).map_err(|_| CoreError::codec(format!("length {len} does not fit")))
}

impl<T: Element> Contents for Vec<T> {
    fn write_contents(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record.value(&(self.len() as u64))?;
        for item in self {
            record.element(item)?;
        }
        Ok(())
    }

    fn read_contents(record: &mut RecordReader<'_>) -> CoreResult<Self> {
        let len = read_len(record)?;
        (0..len).map(|_| record.element()).collect()
    }
}

impl<T: Element + Eq + Hash> Contents for HashSet<T> {
    fn write_contents(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record.value(&(self.len() as u64))?;
        for item in self {
            record.element(item)?;
        }
        Ok(())
    }

    fn read_contents(record: &mut RecordReader<'_>) -> CoreResult<Self> {
        let len = read_len(record)?;
        (0..len).map(|_| record.element()).collect()
    }
}

impl<K: Element + Eq + Hash, V: Element> Contents for HashMap<K, V> {
    fn write_contents(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record.value(&(self.len() as u64))?;
        for (key, value) in self {
            record.element(key)?;
            record.element(value)?;
        }
        Ok(())
    }

    fn read_contents(record: &mut RecordReader<'_>) -> CoreResult<Self> {
        let len = read_len(record)?;
        let mut map = HashMap::with_capacity(len);
        for _ in 0..len {
            let key = record.element()?;
            let value = record.element()?;
            map.insert(key, value);
        }
        Ok(map)
    }
}
