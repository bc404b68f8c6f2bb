//! Use cases over the notes store.

use crate::error::{ServiceError, ServiceResult};
use crate::model::{Note, NotesRoot, Permissions, User};
use crate::validator::validate_note;
use chrono::{Local, NaiveDate};
use livestore_core::{CoreResult, ObjectStore, Storage, StoreConfig, StoreStats};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Name of the user created on first start.
pub const DEFAULT_USER: &str = "admin";
/// Password of the user created on first start.
pub const DEFAULT_PASSWORD: &str = "password";

/// One note, as listed for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteSummary {
    /// Title.
    pub title: String,
    /// Date.
    pub date: NaiveDate,
}

/// One user with the titles of their notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    /// Login name.
    pub name: String,
    /// Permissions, as text.
    pub permissions: String,
    /// The user's notes, in insertion order.
    pub notes: Vec<NoteSummary>,
}

/// A note with its content loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteView {
    /// Title.
    pub title: String,
    /// Date.
    pub date: NaiveDate,
    /// Body text.
    pub content: String,
}

/// Store statistics plus the root id.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Objects with a committed record.
    pub stored_objects: usize,
    /// Objects currently in memory.
    pub live_objects: usize,
    /// Commits in the object log.
    pub commits: u64,
    /// Object log size in bytes.
    pub log_bytes: u64,
    /// Id of the root object.
    pub root: Option<String>,
}

impl StatsReport {
    fn new(stats: StoreStats, store: &ObjectStore) -> Self {
        Self {
            stored_objects: stats.stored_objects,
            live_objects: stats.live_objects,
            commits: stats.commits,
            log_bytes: stats.log_bytes,
            root: store.root_id().map(|id| id.to_string()),
        }
    }
}

/// Users and notes, on top of a [`Storage`] rooted at [`NotesRoot`].
pub struct NoteService {
    storage: Storage<NotesRoot>,
}

impl NoteService {
    /// Wraps opened storage.
    #[must_use]
    pub fn new(storage: Storage<NotesRoot>) -> Self {
        Self { storage }
    }

    /// Opens the store directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub fn open(path: &Path, config: &StoreConfig) -> ServiceResult<Self> {
        Ok(Self::new(Storage::open_path(path, config)?))
    }

    /// The underlying storage.
    #[must_use]
    pub fn storage(&self) -> &Storage<NotesRoot> {
        &self.storage
    }

    /// Creates the default admin when there are no users. Returns whether it
    /// did.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn ensure_default_user(&self) -> ServiceResult<bool> {
        self.storage.write_return(|root, _| -> ServiceResult<bool> {
            let users = root.users()?;
            if !users.is_empty()? {
                return Ok(false);
            }
            info!("creating initial user");
            users.push(User::new(DEFAULT_USER, DEFAULT_PASSWORD, Permissions::Admin)?)?;
            info!(
                "user created, the credentials are `{}={}`",
                DEFAULT_USER, DEFAULT_PASSWORD
            );
            Ok(true)
        })
    }

    /// Looks a user up by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn find_user(&self, name: &str) -> ServiceResult<Option<Arc<User>>> {
        self.storage
            .read_return(|root| -> ServiceResult<_> { Ok(find_user_in(root, name)?) })
    }

    /// Looks a user up by name, failing when there is none.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownUser`] when no user has this name.
    pub fn require_user(&self, name: &str) -> ServiceResult<Arc<User>> {
        self.find_user(name)?.ok_or_else(|| ServiceError::UnknownUser {
            name: name.to_owned(),
        })
    }

    /// Adds a user.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::DuplicateUser`] when the name is taken.
    pub fn add_user(
        &self,
        name: &str,
        password: &str,
        permissions: Permissions,
    ) -> ServiceResult<Arc<User>> {
        self.storage.write_return(|root, _| -> ServiceResult<_> {
            if find_user_in(root, name)?.is_some() {
                return Err(ServiceError::DuplicateUser {
                    name: name.to_owned(),
                });
            }
            let user = User::new(name, password, permissions)?;
            root.users()?.push(user.clone())?;
            Ok(user)
        })
    }

    /// Adds a note to `user`, dated today.
    ///
    /// The note is validated inside the same write, so a rejected note
    /// leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for a rejected note, or the error
    /// of the failed write.
    pub fn insert_note(
        &self,
        user: &Arc<User>,
        title: &str,
        content: &str,
    ) -> ServiceResult<Arc<Note>> {
        self.storage.write_return(|_, _| -> ServiceResult<_> {
            let note = Note::new(user)?;
            user.notes()?.push(note.clone())?;

            note.set_name(title)?;
            note.set_date(Local::now().date_naive())?;
            note.set_content(content)?;

            validate_note(&note)?;
            Ok(note)
        })
    }

    /// Every user with the titles of their notes.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn user_summaries(&self) -> ServiceResult<Vec<UserSummary>> {
        self.storage.read_return(|root| -> ServiceResult<_> {
            let summaries: Vec<UserSummary> = root
                .users()?
                .iter()?
                .map(|user| summarize(&user))
                .collect::<CoreResult<_>>()?;
            Ok(summaries)
        })
    }

    /// The notes of the user called `name`, with their content.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownUser`] when no user has this name.
    pub fn notes_of(&self, name: &str) -> ServiceResult<Vec<NoteView>> {
        self.storage.read_return(|root| -> ServiceResult<_> {
            let user = find_user_in(root, name)?.ok_or_else(|| ServiceError::UnknownUser {
                name: name.to_owned(),
            })?;
            let notes: Vec<NoteView> = user
                .notes()?
                .iter()?
                .map(|note| -> CoreResult<NoteView> {
                    Ok(NoteView {
                        title: note.name()?,
                        date: note.date()?,
                        content: note.content()?,
                    })
                })
                .collect::<CoreResult<_>>()?;
            Ok(notes)
        })
    }

    /// Store statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be read.
    pub fn stats(&self) -> ServiceResult<StatsReport> {
        let store = self.storage.store();
        Ok(StatsReport::new(store.stats()?, store))
    }

    /// Waits for running work and syncs the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn shutdown(&self) -> ServiceResult<()> {
        Ok(self.storage.shutdown()?)
    }
}

fn find_user_in(root: &NotesRoot, name: &str) -> CoreResult<Option<Arc<User>>> {
    for user in root.users()?.iter()? {
        if user.name()? == name {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

fn summarize(user: &User) -> CoreResult<UserSummary> {
    let notes: Vec<NoteSummary> = user
        .notes()?
        .iter()?
        .map(|note| -> CoreResult<NoteSummary> {
            Ok(NoteSummary {
                title: note.name()?,
                date: note.date()?,
            })
        })
        .collect::<CoreResult<_>>()?;
    Ok(UserSummary {
        name: user.name()?,
        permissions: user.permissions()?.to_string(),
        notes,
    })
}
