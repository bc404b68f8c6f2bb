//! A shelf of books, used by the integration tests.

#![allow(dead_code)]

use livestore_core::{
    entity, Backing, Contents, CoreResult, Entity, EntityState, Lazy, Link, Load, ObjectId,
    Persistable, RecordReader, RecordWriter, Root, TxList, TxMap,
};
use std::sync::Arc;

pub struct BookFields {
    title: String,
    pages: u32,
    blurb: Arc<Lazy<String>>,
    shelf: Option<Link<Shelf>>,
}

impl Contents for BookFields {
    fn write_contents(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record.value(&self.title)?.value(&self.pages)?;
        record.reference(&self.blurb);
        match &self.shelf {
            Some(shelf) => record.value(&true)?.link(shelf),
            None => record.value(&false)?,
        };
        Ok(())
    }

    fn read_contents(record: &mut RecordReader<'_>) -> CoreResult<Self> {
        let title = record.value()?;
        let pages = record.value()?;
        let blurb = record.lazy()?;
        let shelved: bool = record.value()?;
        let shelf = if shelved { Some(record.link()?) } else { None };
        Ok(Self {
            title,
            pages,
            blurb,
            shelf,
        })
    }
}

pub struct Book {
    state: EntityState,
    fields: Arc<Backing<BookFields>>,
}

impl Book {
    pub fn new(title: &str, pages: u32, blurb: &str) -> CoreResult<Arc<Self>> {
        let fields = Backing::new(BookFields {
            title: title.to_owned(),
            pages,
            blurb: Lazy::new(blurb.to_owned()),
            shelf: None,
        });
        entity::create(|state| Self { state, fields })
    }

    pub fn title(&self) -> CoreResult<String> {
        self.state.require_read_access()?;
        Ok(self.fields.read().title.clone())
    }

    pub fn pages(&self) -> CoreResult<u32> {
        self.state.require_read_access()?;
        Ok(self.fields.read().pages)
    }

    pub fn set_pages(&self, pages: u32) -> CoreResult<()> {
        self.state.mark_dirty()?;
        self.fields.write().pages = pages;
        Ok(())
    }

    pub fn blurb(&self) -> CoreResult<Arc<Lazy<String>>> {
        self.state.require_read_access()?;
        Ok(self.fields.read().blurb.clone())
    }

    pub fn shelf(&self) -> CoreResult<Option<Arc<Shelf>>> {
        self.state.require_read_access()?;
        let link = self.fields.read().shelf.clone();
        link.map(|link| link.get()).transpose()
    }

    pub fn place_on(&self, shelf: &Arc<Shelf>) -> CoreResult<()> {
        self.state.mark_dirty()?;
        self.fields.write().shelf = Some(Link::to(shelf));
        Ok(())
    }
}

impl Entity for Book {
    fn entity_state(&self) -> &EntityState {
        &self.state
    }

    fn additional_to_persist(&self) -> Vec<Arc<dyn Persistable>> {
        vec![self.fields.clone()]
    }
}

impl Persistable for Book {
    fn object_id(&self) -> ObjectId {
        self.state.object_id()
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn write_flat(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record.reference(&self.fields);
        Ok(())
    }

    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()> {
        record.expect_reference(self.fields.object_id())
    }
}

impl Load for Book {
    const KIND: &'static str = "book";

    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>> {
        let fields = record.reference()?;
        Ok(entity::restore(id, |state| Self { state, fields }))
    }
}

pub struct Shelf {
    state: EntityState,
    books: Arc<TxList<Arc<Book>>>,
    labels: Arc<TxMap<String, String>>,
}

impl Shelf {
    pub fn books(&self) -> CoreResult<Arc<TxList<Arc<Book>>>> {
        self.state.require_read_access()?;
        Ok(self.books.clone())
    }

    pub fn labels(&self) -> CoreResult<Arc<TxMap<String, String>>> {
        self.state.require_read_access()?;
        Ok(self.labels.clone())
    }

    pub fn titles(&self) -> CoreResult<Vec<String>> {
        self.books()?.iter()?.map(|book| book.title()).collect()
    }

    pub fn find(&self, title: &str) -> CoreResult<Option<Arc<Book>>> {
        for book in self.books()?.iter()? {
            if book.title()? == title {
                return Ok(Some(book));
            }
        }
        Ok(None)
    }
}

impl Entity for Shelf {
    fn entity_state(&self) -> &EntityState {
        &self.state
    }
}

impl Persistable for Shelf {
    fn object_id(&self) -> ObjectId {
        self.state.object_id()
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn write_flat(&self, record: &mut RecordWriter) -> CoreResult<()> {
        record.reference(&self.books).reference(&self.labels);
        Ok(())
    }

    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()> {
        record.expect_reference(self.books.object_id())?;
        record.expect_reference(self.labels.object_id())
    }
}

impl Load for Shelf {
    const KIND: &'static str = "shelf";

    fn load(id: ObjectId, record: &mut RecordReader<'_>) -> CoreResult<Arc<Self>> {
        let books = record.reference()?;
        let labels = record.reference()?;
        Ok(entity::restore(id, |state| Self {
            state,
            books,
            labels,
        }))
    }
}

impl Root for Shelf {
    fn create() -> CoreResult<Arc<Self>> {
        let books = TxList::new()?;
        let labels = TxMap::new()?;
        entity::create(|state| Self {
            state,
            books,
            labels,
        })
    }
}
