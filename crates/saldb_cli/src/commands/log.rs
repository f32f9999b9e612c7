//! Log command implementation.

use super::state;
use std::path::Path;

/// Runs the log command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = state::open(path)?;
    let mut log = store.revision_log();
    if let Some(limit) = limit {
        let skip = log.len().saturating_sub(limit);
        log.drain(..skip);
    }

    if format == "json" {
        return state::print_json(&log);
    }

    let tags = store.tags();
    println!("Revision log of {:?}", path);
    println!();
    for meta in log.iter().rev() {
        let labels: Vec<&str> = tags
            .iter()
            .filter(|(_, target)| **target == meta.id)
            .map(|(name, _)| name.as_str())
            .collect();
        print!("{:>6}  {}", meta.id.as_u64(), meta.timestamp.format("%Y-%m-%d %H:%M:%S"));
        if let Some(user) = &meta.user {
            print!("  {user}");
        }
        if !labels.is_empty() {
            print!("  [{}]", labels.join(", "));
        }
        if let Some(note) = &meta.note {
            print!("  {note}");
        }
        println!();
    }
    Ok(())
}
