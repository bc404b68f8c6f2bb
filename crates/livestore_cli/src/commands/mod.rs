//! CLI command implementations.

pub mod add;
pub mod demo;
pub mod notes;
pub mod stats;
pub mod users;

use livestore_cli::NoteService;
use livestore_core::StoreConfig;
use std::path::Path;

/// Opens the notes store and makes sure it has a user to log in with.
pub fn open_service(path: &Path) -> Result<NoteService, Box<dyn std::error::Error>> {
    let service = NoteService::open(path, &StoreConfig::default())?;
    service.ensure_default_user()?;
    Ok(service)
}
