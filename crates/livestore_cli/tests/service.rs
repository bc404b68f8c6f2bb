//! End-to-end tests of the notes service over a file-backed store.

use livestore_cli::model::{Note, Permissions};
use livestore_cli::{NoteService, ServiceError, ValidationError, DEFAULT_USER};
use livestore_core::{CoreError, StoreConfig};
use tempfile::tempdir;

fn open(dir: &std::path::Path) -> NoteService {
    NoteService::open(dir, &StoreConfig::default()).unwrap()
}

#[test]
fn default_user_is_created_once() {
    let dir = tempdir().unwrap();
    let service = open(dir.path());

    assert!(service.ensure_default_user().unwrap());
    assert!(!service.ensure_default_user().unwrap());

    let users = service.user_summaries().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, DEFAULT_USER);
    assert_eq!(users[0].permissions, "admin");
    assert!(users[0].notes.is_empty());
}

#[test]
fn invalid_note_is_rolled_back() {
    let dir = tempdir().unwrap();
    let service = open(dir.path());
    service.ensure_default_user().unwrap();
    let admin = service.find_user(DEFAULT_USER).unwrap().unwrap();

    service
        .insert_note(&admin, "Genesis", "Let there be note")
        .unwrap();
    let before = service.stats().unwrap();

    let err = service
        .insert_note(&admin, "Genesis?", "Let there be note?")
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::QuestionMark)
    ));

    let after = service.stats().unwrap();
    assert_eq!(after.commits, before.commits);
    assert_eq!(after.stored_objects, before.stored_objects);

    let users = service.user_summaries().unwrap();
    let titles: Vec<_> = users[0].notes.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, ["Genesis"]);
}

#[test]
fn blank_title_is_rejected() {
    let dir = tempdir().unwrap();
    let service = open(dir.path());
    service.ensure_default_user().unwrap();
    let admin = service.require_user(DEFAULT_USER).unwrap();

    let err = service.insert_note(&admin, "  ", "body").unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::BlankName)
    ));
    assert!(service.notes_of(DEFAULT_USER).unwrap().is_empty());
}

#[test]
fn user_names_are_unique() {
    let dir = tempdir().unwrap();
    let service = open(dir.path());

    service
        .add_user("ada", "secret", Permissions::User)
        .unwrap();
    let err = service
        .add_user("ada", "other", Permissions::Admin)
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateUser { ref name } if name == "ada"));
    assert_eq!(service.user_summaries().unwrap().len(), 1);
}

#[test]
fn unknown_users_are_reported() {
    let dir = tempdir().unwrap();
    let service = open(dir.path());

    assert!(service.find_user("nobody").unwrap().is_none());
    assert!(matches!(
        service.notes_of("nobody"),
        Err(ServiceError::UnknownUser { ref name }) if name == "nobody"
    ));
}

#[test]
fn user_fields_need_a_transaction() {
    let dir = tempdir().unwrap();
    let service = open(dir.path());
    service.ensure_default_user().unwrap();
    let admin = service.require_user(DEFAULT_USER).unwrap();

    assert!(matches!(admin.name(), Err(CoreError::TransactionAbsent)));
    let name = service
        .storage()
        .read_return(|_| admin.name())
        .unwrap();
    assert_eq!(name, DEFAULT_USER);
}

#[test]
fn copied_note_belongs_to_the_new_user() {
    let dir = tempdir().unwrap();
    let service = open(dir.path());
    service.ensure_default_user().unwrap();
    let admin = service.require_user(DEFAULT_USER).unwrap();
    let ada = service.add_user("ada", "secret", Permissions::User).unwrap();

    let original = service
        .insert_note(&admin, "Recipe", "Flour, water, salt")
        .unwrap();

    service
        .storage()
        .write(|_, _| -> Result<(), CoreError> {
            let copy = Note::copy_from(&original, &ada)?;
            ada.notes()?.push(copy)
        })
        .unwrap();

    let ada_notes = service.notes_of("ada").unwrap();
    assert_eq!(ada_notes.len(), 1);
    assert_eq!(ada_notes[0].title, "Recipe");
    assert_eq!(ada_notes[0].content, "Flour, water, salt");

    let owners = service
        .storage()
        .read_return(|_| -> Result<_, CoreError> {
            let copy = ada.notes()?.get(0)?;
            Ok((copy.parent_user()?.name()?, original.parent_user()?.name()?))
        })
        .unwrap();
    assert_eq!(owners, ("ada".to_owned(), DEFAULT_USER.to_owned()));
}

#[test]
fn notes_survive_reopen() {
    let dir = tempdir().unwrap();
    {
        let service = open(dir.path());
        service.ensure_default_user().unwrap();
        let admin = service.require_user(DEFAULT_USER).unwrap();
        service
            .insert_note(&admin, "Genesis", "Let there be note")
            .unwrap();
        service.shutdown().unwrap();
    }

    let service = open(dir.path());
    assert!(!service.ensure_default_user().unwrap());

    let notes = service.notes_of(DEFAULT_USER).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Genesis");
    assert_eq!(notes[0].content, "Let there be note");

    let parent = service
        .storage()
        .read_return(|root| -> Result<_, CoreError> {
            let admin = root.users()?.get(0)?;
            let note = admin.notes()?.get(0)?;
            Ok(note.parent_user()?.name()?)
        })
        .unwrap();
    assert_eq!(parent, DEFAULT_USER);
}

#[test]
fn content_loads_lazily_after_reopen() {
    let dir = tempdir().unwrap();
    {
        let service = open(dir.path());
        service.ensure_default_user().unwrap();
        let admin = service.require_user(DEFAULT_USER).unwrap();
        service
            .insert_note(&admin, "Long read", "A body worth deferring")
            .unwrap();
        service.shutdown().unwrap();
    }

    let service = open(dir.path());
    let (loaded_before, content, loaded_after) = service
        .storage()
        .read_return(|root| -> Result<_, CoreError> {
            let note = root.users()?.get(0)?.notes()?.get(0)?;
            let handle = note.content_handle()?;
            let before = handle.is_loaded();
            let content = note.content()?;
            Ok((before, content, handle.is_loaded()))
        })
        .unwrap();

    assert!(!loaded_before);
    assert_eq!(content, "A body worth deferring");
    assert!(loaded_after);
}
