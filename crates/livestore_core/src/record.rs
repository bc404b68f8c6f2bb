//! Object records and their field-level reader/writer.
//!
//! A record is the shallow state of one object: its kind plus an ordered list
//! of fields. A field is a plain serde value, a reference to another object by
//! id, or null. Records are CBOR-encoded with `ciborium`.
//!
//! Owning references written with [`RecordWriter::reference`] are collected so
//! the write batch can walk into referenced objects the store has not seen
//! yet. Links written with [`RecordWriter::link`] only record the id.

use crate::error::{CoreError, CoreResult};
use crate::id::ObjectId;
use crate::lazy::{Lazy, LazyValue};
use crate::link::Link;
use crate::persist::{Element, Load, Persistable};
use crate::store::ObjectStore;
use ciborium::value::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Field {
    Value(Value),
    Ref(ObjectId),
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Record {
    pub(crate) kind: String,
    pub(crate) fields: Vec<Field>,
}

impl Record {
    pub(crate) fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes).map_err(CoreError::codec)?;
        Ok(bytes)
    }

    pub(crate) fn decode(bytes: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(bytes).map_err(CoreError::codec)
    }
}

/// Collects the fields of one object while it is being stored.
pub struct RecordWriter {
    fields: Vec<Field>,
    references: Vec<Arc<dyn Persistable>>,
}

impl RecordWriter {
    pub(crate) fn new() -> Self {
        Self {
            fields: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Appends a plain value field.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] if the value cannot be serialized.
    pub fn value<V: Serialize + ?Sized>(&mut self, value: &V) -> CoreResult<&mut Self> {
        let value = Value::serialized(value).map_err(CoreError::codec)?;
        self.fields.push(Field::Value(value));
        Ok(self)
    }

    /// Appends an owning reference. The target is stored along with this
    /// object when the store does not know it yet.
    pub fn reference<T: Persistable>(&mut self, target: &Arc<T>) -> &mut Self {
        self.fields.push(Field::Ref(target.object_id()));
        self.references.push(target.clone());
        self
    }

    /// Appends an optional owning reference; `None` is written as null.
    pub fn optional_reference<T: Persistable>(&mut self, target: Option<&Arc<T>>) -> &mut Self {
        match target {
            Some(target) => self.reference(target),
            None => {
                self.fields.push(Field::Null);
                self
            }
        }
    }

    /// Appends a non-owning link. Only the target id is written.
    pub fn link<T>(&mut self, link: &Link<T>) -> &mut Self {
        self.fields.push(Field::Ref(link.id()));
        self
    }

    /// Appends one container element.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] if the element cannot be serialized.
    pub fn element<E: Element>(&mut self, element: &E) -> CoreResult<&mut Self> {
        element.write_element(self)?;
        Ok(self)
    }

    pub(crate) fn into_parts(self) -> (Vec<Field>, Vec<Arc<dyn Persistable>>) {
        (self.fields, self.references)
    }
}

/// Reads the fields of one record back in the order they were written.
pub struct RecordReader<'a> {
    id: ObjectId,
    fields: std::vec::IntoIter<Field>,
    store: &'a ObjectStore,
}

impl<'a> RecordReader<'a> {
    pub(crate) fn new(id: ObjectId, fields: Vec<Field>, store: &'a ObjectStore) -> Self {
        Self {
            id,
            fields: fields.into_iter(),
            store,
        }
    }

    /// Id of the object whose record is being read.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.id
    }

    /// The store the record came from.
    #[must_use]
    pub fn store(&self) -> &'a ObjectStore {
        self.store
    }

    fn next_field(&mut self) -> CoreResult<Field> {
        self.fields
            .next()
            .ok_or_else(|| CoreError::codec(format!("record {} ended early", self.id)))
    }

    /// Reads a plain value field.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] if the next field is not a value of type `V`.
    pub fn value<V: DeserializeOwned>(&mut self) -> CoreResult<V> {
        match self.next_field()? {
            Field::Value(value) => value.deserialized().map_err(CoreError::codec),
            other => Err(CoreError::codec(format!(
                "record {}: expected a value, found {other:?}",
                self.id
            ))),
        }
    }

    /// Reads a reference field and returns the referenced id without
    /// resolving it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] if the next field is not a reference.
    pub fn reference_id(&mut self) -> CoreResult<ObjectId> {
        match self.next_field()? {
            Field::Ref(id) => Ok(id),
            other => Err(CoreError::codec(format!(
                "record {}: expected a reference, found {other:?}",
                self.id
            ))),
        }
    }

    /// Reads a reference field and checks it still points at `expected`.
    ///
    /// Used by objects whose owned parts are fixed for life when they reload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupted`] when the stored reference differs.
    pub fn expect_reference(&mut self, expected: ObjectId) -> CoreResult<()> {
        let found = self.reference_id()?;
        if found == expected {
            Ok(())
        } else {
            Err(CoreError::corrupted(format!(
                "record {} references {found}, live object holds {expected}",
                self.id
            )))
        }
    }

    /// Reads an owning reference and resolves it, reusing the live instance
    /// when one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is not a reference or the target cannot
    /// be loaded.
    pub fn reference<T: Load>(&mut self) -> CoreResult<Arc<T>> {
        let id = self.reference_id()?;
        self.store.resolve::<T>(id)
    }

    /// Reads an optional owning reference written with
    /// [`RecordWriter::optional_reference`].
    ///
    /// # Errors
    ///
    /// Returns an error if the field is neither null nor a loadable reference.
    pub fn optional_reference<T: Load>(&mut self) -> CoreResult<Option<Arc<T>>> {
        match self.next_field()? {
            Field::Null => Ok(None),
            Field::Ref(id) => self.store.resolve::<T>(id).map(Some),
            Field::Value(_) => Err(CoreError::codec(format!(
                "record {}: expected a reference or null",
                self.id
            ))),
        }
    }

    /// Reads a lazy reference without loading its value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] if the next field is not a reference.
    pub fn lazy<T: LazyValue>(&mut self) -> CoreResult<Arc<Lazy<T>>> {
        let id = self.reference_id()?;
        Ok(Lazy::unloaded(id, self.store.clone()))
    }

    /// Reads a non-owning link. The target is resolved on first access.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] if the next field is not a reference.
    pub fn link<T>(&mut self) -> CoreResult<Link<T>> {
        let id = self.reference_id()?;
        Ok(Link::unresolved(id, self.store.clone()))
    }

    /// Reads one container element.
    ///
    /// # Errors
    ///
    /// Returns an error if the element cannot be decoded or resolved.
    pub fn element<E: Element>(&mut self) -> CoreResult<E> {
        E::read_element(self)
    }
}
