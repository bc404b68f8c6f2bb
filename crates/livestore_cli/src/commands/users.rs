//! Users command implementation.

use super::open_service;
use std::path::Path;

/// Lists every user with the number of notes they own.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(path)?;
    let users = service.user_summaries()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&users)?);
        }
        _ => {
            println!("{:<20} {:<8} NOTES", "NAME", "ROLE");
            for user in &users {
                println!(
                    "{:<20} {:<8} {}",
                    user.name,
                    user.permissions,
                    user.notes.len()
                );
            }
        }
    }

    service.shutdown()?;
    Ok(())
}
