//! Demo command implementation.

use super::open_service;
use livestore_cli::{ServiceError, DEFAULT_USER};
use std::path::Path;
use tracing::error;

/// Runs the demonstration: adds a valid note, then an invalid one that gets
/// rolled back, and lists every user's notes.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(path)?;

    let admin = service
        .find_user(DEFAULT_USER)?
        .ok_or(ServiceError::UnknownUser {
            name: DEFAULT_USER.to_owned(),
        })?;

    service.insert_note(&admin, "Genesis", "Let there be note")?;
    if let Err(err) = service.insert_note(&admin, "Genesis?", "Let there be note?") {
        println!("Error adding the second note!");
        error!(error = %err, "note rejected");
    }

    for user in service.user_summaries()? {
        println!("Notes for user '{}':", user.name);
        for note in user.notes {
            println!("\t{}", note.title);
        }
    }

    service.shutdown()?;
    Ok(())
}
