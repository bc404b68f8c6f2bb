//! Add-user and add-note command implementations.

use super::open_service;
use livestore_cli::model::Permissions;
use std::path::Path;
use tracing::info;

/// Adds a user.
pub fn user(
    path: &Path,
    name: &str,
    password: &str,
    admin: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(path)?;
    let permissions = if admin {
        Permissions::Admin
    } else {
        Permissions::User
    };
    service.add_user(name, password, permissions)?;
    info!(name, %permissions, "user added");
    println!("Added user '{name}'");
    service.shutdown()?;
    Ok(())
}

/// Adds a note to an existing user.
pub fn note(
    path: &Path,
    user: &str,
    title: &str,
    content: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(path)?;
    let owner = service.require_user(user)?;
    service.insert_note(&owner, title, content)?;
    println!("Added note '{title}' for '{user}'");
    service.shutdown()?;
    Ok(())
}
