//! Notes command implementation.

use super::open_service;
use std::path::Path;

/// Prints the notes of one user, with their content.
pub fn run(path: &Path, user: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(path)?;
    let notes = service.notes_of(user)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&notes)?);
        }
        _ => {
            if notes.is_empty() {
                println!("'{user}' has no notes");
            }
            for note in &notes {
                println!("{} ({})", note.title, note.date);
                for line in note.content.lines() {
                    println!("    {line}");
                }
            }
        }
    }

    service.shutdown()?;
    Ok(())
}
