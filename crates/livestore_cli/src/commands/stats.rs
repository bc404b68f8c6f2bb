//! Stats command implementation.

use super::open_service;
use std::path::Path;

/// Prints object counts, log size and the root id.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(path)?;
    let stats = service.stats()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        _ => {
            println!("Store: {}", path.display());
            println!("  Stored objects: {}", stats.stored_objects);
            println!("  Live objects:   {}", stats.live_objects);
            println!("  Commits:        {}", stats.commits);
            println!("  Log size:       {} bytes", stats.log_bytes);
            println!(
                "  Root:           {}",
                stats.root.as_deref().unwrap_or("(none)")
            );
        }
    }

    service.shutdown()?;
    Ok(())
}
