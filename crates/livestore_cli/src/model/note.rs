//! Notes written by users.

use super::user::User;
use chrono::{Local, NaiveDate};
use livestore_core::{
    entity, Backing, Contents, CoreResult, Entity, EntityState, Lazy, Link, Load, ObjectId,
    Persistable, RecordReader, RecordWriter,
};
use std::sync::Arc;
use uuid::Uuid;

struct NoteFields {
    name: String,
    content: Arc<Lazy<String>>,
    date: NaiveDate,
}

impl NoteFields {
    fn empty() -> Self {
        Self {
            name: String::new(),
            content: Lazy::new(String::new()),
            date: Local::now().date_naive(),
        }
    }
}

impl Contents for NoteFields {
    fn write_contents(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record
            .value(&self.name)?
            .reference(&self.content)
            .value(&self.date)?;
        Ok(())
    }

    fn read_contents(record: &mut RecordReader<'_>) -> CoreResult<Self> {
        Ok(Self {
            name: record.value()?,
            content: record.lazy()?,
            date: record.value()?,
        })
    }
}

/// A dated note. Its content is stored separately and loaded on demand.
#[derive(Debug)]
pub struct Note {
    state: EntityState,
    id: Uuid,
    fields: Arc<Backing<NoteFields>>,
    parent: Link<User>,
}

impl Note {
    /// Creates an untitled, empty note dated today.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn new(parent: &Arc<User>) -> CoreResult<Arc<Self>> {
        Self::with_fields(NoteFields::empty(), parent)
    }

    /// Creates a new note with the fields of `note`, owned by `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound or the
    /// content of `note` cannot be loaded.
    pub fn copy_from(note: &Note, parent: &Arc<User>) -> CoreResult<Arc<Self>> {
        note.state.require_read_access()?;
        let copied = {
            let source = note.fields.read();
            NoteFields {
                name: source.name.clone(),
                content: Lazy::new(source.content.get()?),
                date: source.date,
            }
        };
        Self::with_fields(copied, parent)
    }

    fn with_fields(fields: NoteFields, parent: &Arc<User>) -> CoreResult<Arc<Self>> {
        let fields = Backing::new(fields);
        let parent = Link::to(parent);
        entity::create(|state| Self {
            state,
            id: Uuid::new_v4(),
            fields,
            parent,
        })
    }

    /// The note's stable id.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn id(&self) -> CoreResult<Uuid> {
        self.state.require_read_access()?;
        Ok(self.id)
    }

    /// The user the note belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound or the user is
    /// gone.
    pub fn parent_user(&self) -> CoreResult<Arc<User>> {
        self.state.require_read_access()?;
        self.parent.get()
    }

    /// The title.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn name(&self) -> CoreResult<String> {
        self.state.require_read_access()?;
        Ok(self.fields.read().name.clone())
    }

    /// Retitles the note.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn set_name(&self, name: &str) -> CoreResult<()> {
        self.state.mark_dirty()?;
        self.fields.write().name = name.to_owned();
        Ok(())
    }

    /// The body text, loading it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound or the content
    /// cannot be loaded.
    pub fn content(&self) -> CoreResult<String> {
        self.state.require_read_access()?;
        let content = self.fields.read().content.clone();
        content.get()
    }

    /// The lazy handle holding the body text.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn content_handle(&self) -> CoreResult<Arc<Lazy<String>>> {
        self.state.require_read_access()?;
        Ok(self.fields.read().content.clone())
    }

    /// Replaces the body text.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn set_content(&self, content: &str) -> CoreResult<()> {
        self.state.mark_dirty()?;
        self.fields.write().content = Lazy::new(content.to_owned());
        Ok(())
    }

    /// The note's date.
    ///
    /// # Errors
    ///
    /// Returns an error when no live transaction is bound.
    pub fn date(&self) -> CoreResult<NaiveDate> {
        self.state.require_read_access()?;
        Ok(self.fields.read().date)
    }

    /// Redates the note.
    ///
    /// # Errors
    ///
    /// Returns an error when no writable transaction is bound.
    pub fn set_date(&self, date: NaiveDate) -> CoreResult<()> {
        self.state.mark_dirty()?;
        self.fields.write().date = date;
        Ok(())
    }
}

impl Entity for Note {
    fn entity_state(&self) -> &EntityState {
        &self.state
    }

    fn additional_to_persist(&self) -> Vec<Arc<dyn Persistable>> {
        vec![self.fields.clone()]
    }
}

impl Persistable for Note {
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
            .link(&self.parent);
        Ok(())
    }

    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()> {
        let _id: Uuid = record.element()?;
        record.expect_reference(self.fields.object_id())
    }
}

impl Load for Note {
    const KIND: &'static str = "note";

    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>> {
        let uuid = record.element()?;
        let fields = record.reference()?;
        let parent = record.link()?;
        Ok(entity::restore(id, |state| Self {
            state,
            id: uuid,
            fields,
            parent,
        }))
    }
}
