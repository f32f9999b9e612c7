//! Rollback command implementation.

use super::state;
use std::path::Path;

/// Runs the rollback command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = state::open(path)?;
    let latest = store.current_revision();

    if dry_run {
        println!("(dry run - no changes will be made)");
        println!("  Would remove revision {}", latest.as_u64());
        return Ok(());
    }

    let now = store.roll_back()?;
    state::save(&store, path)?;
    println!("✓ Removed revision {}; latest is now {}", latest.as_u64(), now.as_u64());
    Ok(())
}
