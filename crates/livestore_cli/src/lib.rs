//! # livestore notes
//!
//! A small users-and-notes application on top of `livestore_core`, used by
//! the `livestore` command-line tool.
//!
//! Users live in a list under the [`NotesRoot`](model::NotesRoot). Each user
//! owns a list of notes, and every note keeps a non-owning link back to its
//! user. Note content is a lazy value, loaded the first time it is read.
//!
//! All changes go through [`NoteService`], which runs each use case in a
//! single write scope: a note that fails [`validate_note`] is rolled back
//! together with everything else that write did.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod model;
mod service;
pub mod validator;

pub use error::{ServiceError, ServiceResult, ValidationError};
pub use service::{
    NoteService, NoteSummary, NoteView, StatsReport, UserSummary, DEFAULT_PASSWORD, DEFAULT_USER,
};
pub use validator::validate_note;
