//! Users and their permissions.

use super::note::Note;
use livestore_core::{
    entity, Backing, Contents, CoreResult, Entity, EntityState, Load, ObjectId, Persistable,
    RecordReader, RecordWriter, TxList,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// What a user is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permissions {
    /// Full access.
    Admin,
    /// Access to the user's own notes.
    User,
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::User => write!(f, "user"),
        }
    }
}

struct UserFields {
    name: String,
    password: String,
    permissions: Permissions,
}

impl Contents for UserFields {
    fn write_contents(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record
            .value(&self.name)?
            .value(&self.password)?
            .value(&self.permissions)?;
        Ok(())
    }

    fn read_contents(record: &mut RecordReader<'_>) -> CoreResult<Self> {
        Ok(Self {
            name: record.value()?,
            password: record.value()?,
            permissions: record.value()?,
        })
    }
}

/// A user owning a list of notes.
#[derive(Debug)]
pub struct User {
    state: EntityState,
    id: Uuid,
    fields: Arc<Backing<UserFields>>,
    notes: Arc<TxList<Arc<Note>>>,
}

impl User {
    /// Creates a user without notes.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn new(name: &str, password: &str, permissions: Permissions) -> CoreResult<Arc<Self>> {
        let fields = Backing::new(UserFields {
            name: name.to_owned(),
            password: password.to_owned(),
            permissions,
        });
        let notes = TxList::new()?;
        entity::create(|state| Self {
            state,
            id: Uuid::new_v4(),
            fields,
            notes,
        })
    }

    /// The user's stable id.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn id(&self) -> CoreResult<Uuid> {
        self.state.require_read_access()?;
        Ok(self.id)
    }

    /// The user's notes.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn notes(&self) -> CoreResult<Arc<TxList<Arc<Note>>>> {
        self.state.require_read_access()?;
        Ok(self.notes.clone())
    }

    /// The login name.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn name(&self) -> CoreResult<String> {
        self.state.require_read_access()?;
        Ok(self.fields.read().name.clone())
    }

    /// Renames the user.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn set_name(&self, name: &str) -> CoreResult<()> {
        self.state.mark_dirty()?;
        self.fields.write().name = name.to_owned();
        Ok(())
    }

    /// The stored password.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn password(&self) -> CoreResult<String> {
        self.state.require_read_access()?;
        Ok(self.fields.read().password.clone())
    }

    /// Replaces the password.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn set_password(&self, password: &str) -> CoreResult<()> {
        self.state.mark_dirty()?;
        self.fields.write().password = password.to_owned();
        Ok(())
    }

    /// The user's permissions.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn permissions(&self) -> CoreResult<Permissions> {
        self.state.require_read_access()?;
        Ok(self.fields.read().permissions)
    }

    /// Changes the user's permissions.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn set_permissions(&self, permissions: Permissions) -> CoreResult<()> {
        self.state.mark_dirty()?;
        self.fields.write().permissions = permissions;
        Ok(())
    }
}

impl Entity for User {
    fn entity_state(&self) -> &EntityState {
        &self.state
    }

    fn additional_to_persist(&self) -> Vec<Arc<dyn Persistable>> {
        vec![self.fields.clone()]
    }
}

impl Persistable for User {
    fn object_id(&self) -> ObjectId {
        self.state.object_id()
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn write_flat(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record
            .element(&self.id)?
            .reference(&self.fields)
            .reference(&self.notes);
        Ok(())
    }

    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()> {
        let _id: Uuid = record.element()?;
        record.expect_reference(self.fields.object_id())?;
        record.expect_reference(self.notes.object_id())
    }
}

impl Load for User {
    const KIND: &'static str = "user";

    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>> {
        let uuid = record.element()?;
        let fields = record.reference()?;
        let notes = record.reference()?;
        Ok(entity::restore(id, |state| Self {
            state,
            id: uuid,
            fields,
            notes,
        }))
    }
}
