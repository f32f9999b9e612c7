//! Tags command implementation.

use super::state;
use std::path::Path;

/// Runs the tags command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = state::open(path)?;
    let tags = store.tags();

    if format == "json" {
        return state::print_json(&tags);
    }

    if tags.is_empty() {
        println!("No tags");
        return Ok(());
    }
    for (name, target) in &tags {
        println!("{name:<24} {}", target.as_u64());
    }
    Ok(())
}
