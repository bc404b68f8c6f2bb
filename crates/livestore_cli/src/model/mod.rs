//! The notes domain model.

mod note;
mod user;

pub use note::Note;
pub use user::{Permissions, User};

use livestore_core::{
    entity, CoreResult, Entity, EntityState, Load, ObjectId, Persistable, RecordReader,
    RecordWriter, Root, TxList,
};
use std::sync::Arc;

/// Root of the notes store: every user, and through them every note.
pub struct NotesRoot {
    state: EntityState,
    users: Arc<TxList<Arc<User>>>,
}

impl NotesRoot {
    /// All users.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn users(&self) -> CoreResult<Arc<TxList<Arc<User>>>> {
        self.state.require_read_access()?;
        Ok(self.users.clone())
    }
}

impl Root for NotesRoot {
    fn create() -> CoreResult<Arc<Self>> {
        let users = TxList::new()?;
        entity::create(|state| Self { state, users })
    }
}

impl Entity for NotesRoot {
    fn entity_state(&self) -> &EntityState {
        &self.state
    }
}

impl Persistable for NotesRoot {
    fn object_id(&self) -> ObjectId {
        self.state.object_id()
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn write_flat(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record.reference(&self.users);
        Ok(())
    }

    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()> {
        record.expect_reference(self.users.object_id())
    }
}

impl Load for NotesRoot {
    const KIND: &'static str = "notes-root";

    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>> {
        let users = record.reference()?;
        Ok(entity::restore(id, |state| Self { state, users }))
    }
}
