//! Reopening stores and surviving failures.

mod common;

use common::{Book, Shelf};
use livestore_core::{CoreError, CoreResult, ObjectStore, Persistable, Storage, StoreConfig};
use livestore_storage::{FaultyBackend, InMemoryBackend, StorageError};
use std::sync::Arc;

fn open_memory(memory: &InMemoryBackend) -> CoreResult<Storage<Shelf>> {
    let store = ObjectStore::open_with_backend(Box::new(memory.clone()), &StoreConfig::default())?;
    Storage::open(store)
}

fn shelve(storage: &Storage<Shelf>, title: &str, pages: u32) -> Arc<Book> {
    storage
        .write_return(|shelf, _| -> CoreResult<_> {
            let book = Book::new(title, pages, &format!("about {title}"))?;
            let root = storage
                .store()
                .load_root::<Shelf>()?
                .ok_or(CoreError::invalid_operation("store has no root"))?;
            book.place_on(&root)?;
            shelf.books()?.push(book.clone())?;
            Ok(book)
        })
        .unwrap()
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default();
    {
        let storage = Storage::<Shelf>::open_path(dir.path(), &config).unwrap();
        shelve(&storage, "Persuasion", 250);
        storage
            .write(|shelf, _| -> CoreResult<()> {
                shelf.labels()?.insert("room".to_owned(), "attic".to_owned())?;
                Ok(())
            })
            .unwrap();
        storage.shutdown().unwrap();
    }

    let storage = Storage::<Shelf>::open_path(dir.path(), &config).unwrap();
    let (titles, room, blurb) = storage
        .read_return(|shelf| -> CoreResult<_> {
            let book = shelf.find("Persuasion")?.ok_or(CoreError::invalid_operation("missing"))?;
            let blurb = book.blurb()?;
            assert!(!blurb.is_loaded());
            Ok((
                shelf.titles()?,
                shelf.labels()?.get(&"room".to_owned())?,
                blurb.get()?,
            ))
        })
        .unwrap();
    assert_eq!(titles, vec!["Persuasion".to_owned()]);
    assert_eq!(room.as_deref(), Some("attic"));
    assert_eq!(blurb, "about Persuasion");
}

#[test]
fn second_opener_is_locked_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default();
    let _first = Storage::<Shelf>::open_path(dir.path(), &config).unwrap();
    let second = Storage::<Shelf>::open_path(dir.path(), &config);
    assert!(matches!(second, Err(CoreError::StoreLocked)));
}

#[test]
fn missing_directory_is_an_error_without_create() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default().create_if_missing(false);
    let result = Storage::<Shelf>::open_path(&dir.path().join("absent"), &config);
    assert!(result.is_err());
}

#[test]
fn links_resolve_after_reopen() {
    let memory = InMemoryBackend::new();
    let root_id = {
        let storage = open_memory(&memory).unwrap();
        shelve(&storage, "Kindred", 264);
        storage.store().root_id().unwrap()
    };

    let storage = open_memory(&memory).unwrap();
    let linked = storage
        .read_return(|shelf| -> CoreResult<_> {
            let book = shelf.find("Kindred")?.ok_or(CoreError::invalid_operation("missing"))?;
            Ok(book.shelf()?.map(|linked| linked.object_id()))
        })
        .unwrap();
    assert_eq!(linked, Some(root_id));
}

#[test]
fn failed_commit_restores_the_last_committed_graph() {
    let memory = InMemoryBackend::new();
    let (backend, faults) = FaultyBackend::new(Box::new(memory.clone()));
    let store = ObjectStore::open_with_backend(Box::new(backend), &StoreConfig::default()).unwrap();
    let storage = Storage::<Shelf>::open(store).unwrap();
    let book = shelve(&storage, "Frankenstein", 280);
    let committed_bytes = memory.snapshot();

    faults.fail_flushes(true);
    let result = storage.write(|shelf, _| -> CoreResult<()> {
        book.set_pages(999)?;
        shelf.books()?.push(Book::new("Lost", 1, "")?)
    });
    assert!(matches!(
        result,
        Err(CoreError::Storage(StorageError::Injected { .. }))
    ));
    assert_eq!(memory.snapshot(), committed_bytes);

    faults.fail_flushes(false);
    let (pages, titles) = storage
        .read_return(|shelf| -> CoreResult<_> { Ok((book.pages()?, shelf.titles()?)) })
        .unwrap();
    assert_eq!(pages, 280);
    assert_eq!(titles, vec!["Frankenstein".to_owned()]);

    storage
        .write(|_, _| -> CoreResult<()> { book.set_pages(281) })
        .unwrap();
    drop(storage);
    let reopened = open_memory(&memory).unwrap();
    let pages = reopened
        .read_return(|shelf| -> CoreResult<_> {
            shelf.find("Frankenstein")?.map(|book| book.pages()).transpose()
        })
        .unwrap();
    assert_eq!(pages, Some(281));
}

#[test]
fn torn_tail_drops_only_the_last_commit() {
    let memory = InMemoryBackend::new();
    {
        let storage = open_memory(&memory).unwrap();
        shelve(&storage, "First", 1);
        shelve(&storage, "Second", 2);
    }
    let bytes = memory.snapshot();
    let torn = InMemoryBackend::with_bytes(bytes[..bytes.len() - 3].to_vec());

    let storage = open_memory(&torn).unwrap();
    let titles = storage.read_return(|shelf| shelf.titles()).unwrap();
    assert_eq!(titles, vec!["First".to_owned()]);
    shelve(&storage, "Third", 3);
    drop(storage);

    let storage = open_memory(&torn).unwrap();
    let titles = storage.read_return(|shelf| shelf.titles()).unwrap();
    assert_eq!(titles, vec!["First".to_owned(), "Third".to_owned()]);
}

#[test]
fn corrupted_record_fails_to_open() {
    let memory = InMemoryBackend::new();
    {
        let storage = open_memory(&memory).unwrap();
        shelve(&storage, "Corrupt", 1);
    }
    // First payload byte of the first frame.
    memory.corrupt_byte(11);
    let result = open_memory(&memory);
    assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
}
